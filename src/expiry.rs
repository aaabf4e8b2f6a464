use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};

/// Layout of the `expiration` key in the credentials file, always UTC.
pub const EXPIRATION_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Result of checking an existing short-term record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validity {
    pub valid: bool,
    pub seconds_remaining: i64,
}

impl Validity {
    const fn expired(seconds_remaining: i64) -> Self {
        Self {
            valid: false,
            seconds_remaining,
        }
    }
}

/// Decides whether the stored credentials can be kept.
///
/// `force` wins over everything, a missing expiration means the profile was
/// never refreshed. The comparison is done on whole unix seconds, which is the
/// precision of the stored value.
pub fn is_still_valid(expiration: Option<DateTime<Utc>>, now: DateTime<Utc>, force: bool) -> Validity {
    if force {
        return Validity::expired(0);
    }
    let Some(expiration) = expiration else {
        return Validity::expired(0);
    };

    let seconds_remaining = expiration.timestamp() - now.timestamp();
    Validity {
        valid: seconds_remaining > 0,
        seconds_remaining,
    }
}

pub fn format_expiration(expiration: DateTime<Utc>) -> String {
    expiration.format(EXPIRATION_FORMAT).to_string()
}

pub fn parse_expiration(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value.trim(), EXPIRATION_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Drops sub-second precision so a value survives a format/parse cycle unchanged.
pub fn truncate_to_seconds(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant.trunc_subsecs(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[rstest]
    #[case(1, true)]
    #[case(3600, true)]
    #[case(0, false)]
    #[case(-1, false)]
    #[case(-86400, false)]
    fn validity_follows_remaining_seconds(#[case] offset: i64, #[case] valid: bool) {
        let expiration = now() + Duration::seconds(offset);
        let validity = is_still_valid(Some(expiration), now(), false);
        assert_eq!(
            validity,
            Validity {
                valid,
                seconds_remaining: offset
            }
        );
    }

    #[rstest]
    #[case(Some(3600))]
    #[case(Some(-3600))]
    #[case(None)]
    fn force_always_refreshes(#[case] offset: Option<i64>) {
        let expiration = offset.map(|o| now() + Duration::seconds(o));
        assert!(!is_still_valid(expiration, now(), true).valid);
    }

    #[test]
    fn force_ignores_far_future() {
        let expiration = Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap();
        assert!(!is_still_valid(Some(expiration), now(), true).valid);
    }

    #[test]
    fn absent_expiration_is_not_valid() {
        assert_eq!(is_still_valid(None, now(), false), Validity::expired(0));
    }

    #[test]
    fn sub_second_now_does_not_drift() {
        let expiration = now() + Duration::seconds(10);
        let later = now() + Duration::milliseconds(999);
        assert_eq!(is_still_valid(Some(expiration), later, false).seconds_remaining, 10);
    }

    #[test]
    fn parse_and_format_agree() {
        let parsed = parse_expiration("2099-01-01 00:00:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(format_expiration(parsed), "2099-01-01 00:00:00");
    }

    #[rstest]
    #[case("")]
    #[case("tomorrow")]
    #[case("2024-05-01T12:00:00Z")]
    #[case("2024-13-01 00:00:00")]
    fn parse_rejects_other_layouts(#[case] value: &str) {
        assert_eq!(parse_expiration(value), None);
    }

    #[test]
    fn truncate_drops_subseconds() {
        let instant = now() + Duration::milliseconds(1500);
        let truncated = truncate_to_seconds(instant);
        assert_eq!(truncated, now() + Duration::seconds(1));
        assert_eq!(parse_expiration(&format_expiration(truncated)), Some(truncated));
    }
}
