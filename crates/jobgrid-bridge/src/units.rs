//! Memory unit normalisation.

/// Units a bare number is read in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemUnit {
    Kb,
    Mb,
    Gb,
}

/// Parse a scheduler memory figure into GB.
///
/// Accepts `4000M`, `4G`, `512K`, `1T`, `4000Mn`/`4000Mc` (SLURM per-node
/// and per-CPU suffixes), `191000+` (sinfo lower bounds) and LSF's
/// `1.5 Gbytes`. Bare numbers use `bare`. Placeholders such as `-`,
/// `N/A` and empty strings read as zero. Garbage returns `None`.
pub fn parse_memory_gb(raw: &str, bare: MemUnit) -> Option<f64> {
    let s = raw.trim().trim_end_matches('+');
    if s.is_empty() || s == "-" || s.eq_ignore_ascii_case("n/a") {
        return Some(0.0);
    }

    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (num, unit) = s.split_at(split);
    let value: f64 = num.parse().ok()?;
    let unit = unit.trim().to_ascii_lowercase();

    let unit = match unit.chars().next() {
        None => bare,
        Some('k') => MemUnit::Kb,
        Some('m') => MemUnit::Mb,
        Some('g') => MemUnit::Gb,
        Some('t') => return Some(value * 1024.0),
        Some('b') => return Some(value / (1024.0 * 1024.0 * 1024.0)),
        Some(_) => return None,
    };

    Some(match unit {
        MemUnit::Kb => value / (1024.0 * 1024.0),
        MemUnit::Mb => value / 1024.0,
        MemUnit::Gb => value,
    })
}
