//! Instruments that run the shared rule sequence with only their KOAID prefix,
//! search directories and file naming specialized.

use std::path::PathBuf;

use super::base::datafile_original_name;
use super::{InstrumentKind, InstrumentProfile, Rule, StepFn};
use crate::keywords::{AliasTable, Keyword, KeywordResolver};

pub fn deimos_profile() -> InstrumentProfile {
    InstrumentProfile {
        search_dirs: deimos_dirs(),
        ..InstrumentProfile::base(InstrumentKind::Deimos, deimos_prefix)
    }
}

fn deimos_dirs() -> Vec<PathBuf> {
    (1..=3)
        .flat_map(|i| {
            let root = format!("/s/sdata100{}", i);
            (1..=20)
                .map(move |j| PathBuf::from(format!("{}/deimos{}", root, j)))
                .chain(std::iter::once(PathBuf::from(format!("/s/sdata100{}/dmoseng", i))))
        })
        .collect()
}

/// Focus-camera frames are written under an `/fcs` OUTDIR
fn deimos_prefix(kw: &KeywordResolver<'_>) -> Option<&'static str> {
    let outdir = kw.get_str(Keyword::Outdir).ok().unwrap_or_default();
    if outdir.contains("/fcs") {
        Some("DF")
    } else {
        Some("DE")
    }
}

pub fn osiris_profile() -> InstrumentProfile {
    InstrumentProfile {
        aliases: AliasTable::new().with(Keyword::Outfile, "DATAFILE"),
        search_dirs: osiris_dirs(),
        overrides: osiris_overrides,
        ..InstrumentProfile::base(InstrumentKind::Osiris, osiris_prefix)
    }
}

fn osiris_overrides(rule: Rule) -> Option<StepFn> {
    let run: StepFn = match rule {
        Rule::OriginalName => datafile_original_name,
        _ => return None,
    };
    Some(run)
}

fn osiris_dirs() -> Vec<PathBuf> {
    (0..2)
        .flat_map(|i| {
            let root = format!("/s/sdata110{}", i);
            std::iter::once(PathBuf::from(format!("{}/osiris", root)))
                .chain((1..=20).map({
                    let root = root.clone();
                    move |j| PathBuf::from(format!("{}/osiris{}", root, j))
                }))
                .chain(
                    ["osiriseng", "osrseng"]
                        .into_iter()
                        .map(move |account| PathBuf::from(format!("{}/{}", root, account))),
                )
        })
        .collect()
}

/// OUTDIR distinguishes the imager (OI) from the spectrograph (OS)
fn osiris_prefix(kw: &KeywordResolver<'_>) -> Option<&'static str> {
    let outdir = kw.get_str(Keyword::Outdir).ok()?;
    if outdir.contains("/scam") {
        Some("OI")
    } else if outdir.contains("/spec") {
        Some("OS")
    } else {
        None
    }
}
