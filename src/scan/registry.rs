use super::connectivity::CONNECTIVITY;
use super::handshake::TLS_HANDSHAKE;
use super::session::TLS_SESSION;
use super::{Family, Scanner};
use regex::Regex;

static ALL_FAMILIES: &[&Family] = &[&CONNECTIVITY, &TLS_HANDSHAKE, &TLS_SESSION];

pub fn all_families() -> &'static [&'static Family] {
    ALL_FAMILIES
}

#[derive(Clone, Debug)]
pub struct Selection {
    pub family: &'static Family,
    pub scanners: Vec<&'static dyn Scanner>,
}

pub fn select(families: &[&'static Family], family: &Regex, scanner: &Regex) -> Vec<Selection> {
    families
        .iter()
        .filter(|f| family.is_match(f.name))
        .filter_map(|f| {
            let scanners: Vec<&'static dyn Scanner> = f
                .scanners
                .iter()
                .copied()
                .filter(|s| scanner.is_match(s.name()))
                .collect();
            (!scanners.is_empty()).then_some(Selection {
                family: *f,
                scanners,
            })
        })
        .collect()
}
