//! Parser for `list-units --plain` output
//!
//! Line grammar: `unit load active sub description...`. The first line is the
//! column header. Lines that don't fit the grammar (legend, footer, other unit
//! types) are dropped, never reported.

use crate::unit::UnitRecord;

/// Markers some manager versions print in front of failed units even with
/// `--plain`
const BULLETS: [&str; 2] = ["●", "*"];

/// Split off the next whitespace-delimited field
fn next_field(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_start();
    if s.is_empty() {
        return None;
    }
    match s.find(char::is_whitespace) {
        Some(end) => Some((&s[..end], &s[end..])),
        None => Some((s, "")),
    }
}

/// Parse a single listing line into a record, if it describes a service
pub fn parse_line(line: &str) -> Option<UnitRecord> {
    let mut rest = line.trim_start();
    if let Some((first, after)) = next_field(rest) {
        if BULLETS.contains(&first) {
            rest = after;
        }
    }

    let (unit, rest) = next_field(rest)?;
    let (load, rest) = next_field(rest)?;
    let (active, rest) = next_field(rest)?;
    let (sub, rest) = next_field(rest)?;
    let description = rest.trim();

    UnitRecord::from_full_name(unit, load, active, sub, description)
}

/// Parse raw listing output into records, in listing order
pub fn parse_list_units(raw: &str) -> Vec<UnitRecord> {
    raw.lines()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .filter_map(parse_line)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
UNIT                         LOAD      ACTIVE   SUB     DESCRIPTION
accounts-daemon.service      loaded    active   running Accounts Service
cups.service                 loaded    failed   failed  CUPS Scheduler
dev-sda1.device              loaded    active   plugged Samsung SSD
nginx.service                loaded    active   running \"A web server\"
rescue.service               not-found inactive dead    rescue.service
systemd-fsck@dev-sda2.service loaded   inactive dead

LOAD   = Reflects whether the unit definition was properly loaded.
6 loaded units listed.
";

    #[test]
    fn test_parse_listing() {
        let units = parse_list_units(LISTING);
        let names: Vec<_> = units.iter().map(|u| u.short_name.as_str()).collect();
        assert_eq!(
            names,
            vec!["accounts-daemon", "cups", "nginx", "rescue", "systemd-fsck@dev-sda2"]
        );

        let nginx = &units[2];
        assert_eq!(nginx.full_name, "nginx.service");
        assert_eq!(nginx.load_state, "loaded");
        assert_eq!(nginx.active_state, "active");
        assert_eq!(nginx.sub_state, "running");
        assert_eq!(nginx.description, "\"A web server\"");

        // Exactly four fields: description is empty
        assert_eq!(units[4].description, "");
    }

    #[test]
    fn test_full_name_invariant_and_line_count() {
        let units = parse_list_units(LISTING);
        for u in &units {
            assert_eq!(u.full_name, format!("{}.service", u.short_name));
        }
        assert!(LISTING.lines().count() >= units.len() + 1);
    }

    #[test]
    fn test_description_keeps_inner_whitespace() {
        let raw = "UNIT LOAD ACTIVE SUB DESCRIPTION\nfoo.service loaded active running Foo   Bar  Daemon  \n";
        let units = parse_list_units(raw);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].description, "Foo   Bar  Daemon");
    }

    #[test]
    fn test_header_only_and_empty_input() {
        assert!(parse_list_units("").is_empty());
        assert!(parse_list_units("UNIT LOAD ACTIVE SUB DESCRIPTION\n").is_empty());
    }

    #[test]
    fn test_first_line_always_skipped() {
        // Even when the first line looks like a unit, it is the header slot
        let raw = "a.service loaded active running A\nb.service loaded active running B\n";
        let units = parse_list_units(raw);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].short_name, "b");
    }

    #[test]
    fn test_short_lines_dropped() {
        let raw = "UNIT LOAD ACTIVE SUB DESCRIPTION\nbroken.service loaded active\nok.service loaded active exited\n";
        let units = parse_list_units(raw);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].short_name, "ok");
    }

    #[test]
    fn test_bullet_marker_skipped() {
        let raw = "UNIT LOAD ACTIVE SUB DESCRIPTION\n● cups.service loaded failed failed CUPS\n";
        let units = parse_list_units(raw);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].short_name, "cups");
        assert_eq!(units[0].active_state, "failed");
    }
}
