use crate::models::{MatchCriteria, ProcessRecord};

/// Result of scanning one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection<'a> {
    pub found: bool,
    pub record: Option<&'a ProcessRecord>,
}

/// First record in snapshot order that satisfies `criteria`.
///
/// Records after the first match are never inspected.
pub fn detect<'a>(records: &'a [ProcessRecord], criteria: &MatchCriteria) -> Detection<'a> {
    let record = records.iter().find(|r| criteria.matches(r));
    Detection {
        found: record.is_some(),
        record,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(pid: u32, name: &str, user: &str, args: &[&str]) -> ProcessRecord {
        ProcessRecord::new(pid, name, user, args.iter().map(|s| s.to_string()).collect())
    }

    fn criteria() -> MatchCriteria {
        MatchCriteria::new("nginx", "www", "daemon off")
    }

    #[test]
    fn test_first_match_wins() {
        let records = vec![
            rec(10, "sshd", "www", &["sshd", "daemon off"]),
            rec(11, "nginx", "root", &["nginx", "-g", "daemon off;"]),
            rec(12, "nginx", "www", &["nginx", "-g", "daemon off;"]),
            rec(13, "nginx", "www", &["nginx", "-g", "daemon off;"]),
        ];
        let detection = detect(&records, &criteria());
        assert!(detection.found);
        assert_eq!(detection.record.map(|r| r.pid), Some(12));
    }

    #[test]
    fn test_not_found() {
        let records = vec![
            rec(10, "nginx", "www", &["nginx", "-c", "/etc/nginx.conf"]),
            rec(11, "nginx", "root", &["nginx", "daemon off"]),
        ];
        let detection = detect(&records, &criteria());
        assert!(!detection.found);
        assert!(detection.record.is_none());
    }

    #[test]
    fn test_empty_snapshot() {
        let detection = detect(&[], &criteria());
        assert!(!detection.found);
    }

    #[test]
    fn test_name_is_exact_match() {
        let records = vec![rec(10, "/usr/sbin/nginx", "www", &["/usr/sbin/nginx", "daemon off"])];
        assert!(!detect(&records, &criteria()).found);
    }

    #[test]
    fn test_substring_may_appear_in_any_argument() {
        let records = vec![rec(10, "nginx", "www", &["nginx", "-g", "pid /run/x; daemon off;"])];
        assert!(detect(&records, &criteria()).found);
    }
}
