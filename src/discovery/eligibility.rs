use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Timelike};

use crate::metadata::EpisodeDetails;

/// Local hour after which an episode is announced even if the provider has
/// not filled in its overview, still image or runtime yet.
pub const COMPLETENESS_CUTOFF_HOUR: u32 = 20;

/// Whether `episode` should be announced at `now` for a series tracked since
/// `epoch` (Unix seconds).
///
/// All of these must hold:
/// - the air date is present and parses as `YYYY-MM-DD`
/// - the air date is today or earlier, in `now`'s time zone
/// - local midnight of the air date is not before `epoch`
/// - the metadata is complete, or it is [`COMPLETENESS_CUTOFF_HOUR`] or later
pub fn is_eligible<Tz: TimeZone>(episode: &EpisodeDetails, epoch: i64, now: &DateTime<Tz>) -> bool {
    let Some(air_date) = episode.air_date() else {
        return false;
    };

    if air_date > now.date_naive() {
        return false;
    }

    match local_midnight(&now.timezone(), air_date) {
        Some(midnight) if midnight >= epoch => {}
        _ => return false,
    }

    episode.has_complete_metadata() || now.hour() >= COMPLETENESS_CUTOFF_HOUR
}

/// Unix seconds of the first instant of `date` in `tz`.
///
/// Zones that skip midnight on a DST change start that day at 01:00.
fn local_midnight<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> Option<i64> {
    let midnight: NaiveDateTime = date.and_hms_opt(0, 0, 0)?;
    tz.from_local_datetime(&midnight)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(midnight + Duration::hours(1))).earliest())
        .map(|t| t.timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};
    use proptest::prelude::*;

    fn complete(air_date: &str) -> EpisodeDetails {
        EpisodeDetails {
            air_date: Some(air_date.to_string()),
            overview: Some("Things happen.".into()),
            still_path: Some("/still.jpg".into()),
            runtime: Some(45),
            ..Default::default()
        }
    }

    fn at(date: &str, hour: u32, minute: u32) -> DateTime<Utc> {
        let d = NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap();
        Utc.from_utc_datetime(&d.and_hms_opt(hour, minute, 0).unwrap())
    }

    fn epoch(date: &str) -> i64 {
        at(date, 0, 0).timestamp()
    }

    #[test]
    fn test_aired_today_is_eligible() {
        let now = at("2024-03-10", 12, 0);
        assert!(is_eligible(&complete("2024-03-10"), epoch("2024-03-01"), &now));
    }

    #[test]
    fn test_airs_tomorrow_is_not_eligible() {
        let now = at("2024-03-10", 23, 59);
        assert!(!is_eligible(&complete("2024-03-11"), epoch("2024-03-01"), &now));
    }

    #[test]
    fn test_aired_before_epoch_is_not_eligible() {
        let now = at("2024-03-10", 12, 0);
        assert!(!is_eligible(&complete("2024-02-28"), epoch("2024-03-01"), &now));
    }

    #[test]
    fn test_aired_on_subscription_day_after_midnight_is_not_eligible() {
        // Subscribed at noon; that day's midnight is before the epoch
        let now = at("2024-03-10", 21, 0);
        let epoch = at("2024-03-10", 12, 0).timestamp();
        assert!(!is_eligible(&complete("2024-03-10"), epoch, &now));
        assert!(is_eligible(&complete("2024-03-11"), epoch, &at("2024-03-11", 21, 0)));
    }

    #[test]
    fn test_missing_or_malformed_air_date_is_excluded() {
        let now = at("2024-03-10", 21, 0);
        let e = epoch("2024-01-01");
        assert!(!is_eligible(&complete("2024-13-40"), e, &now));
        assert!(!is_eligible(&complete(""), e, &now));

        let mut no_date = complete("2024-03-01");
        no_date.air_date = None;
        assert!(!is_eligible(&no_date, e, &now));
    }

    #[test]
    fn test_incomplete_metadata_deferred_until_cutoff() {
        let mut ep = complete("2024-03-10");
        ep.overview = None;
        let e = epoch("2024-03-01");

        assert!(!is_eligible(&ep, e, &at("2024-03-10", 19, 59)));
        assert!(is_eligible(&ep, e, &at("2024-03-10", 20, 1)));
    }

    #[test]
    fn test_uses_local_date_of_now() {
        // 2024-03-10 23:30 UTC is already 2024-03-11 in UTC+2
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        let now = at("2024-03-10", 23, 30).with_timezone(&plus_two);
        assert!(is_eligible(&complete("2024-03-11"), epoch("2024-03-01"), &now));
        assert!(!is_eligible(
            &complete("2024-03-11"),
            epoch("2024-03-01"),
            &at("2024-03-10", 23, 30)
        ));
    }

    proptest! {
        #[test]
        fn prop_future_air_dates_never_eligible(days_ahead in 1i64..400, hour in 0u32..24) {
            let now = at("2024-06-15", hour, 0);
            let air = (now.date_naive() + Duration::days(days_ahead)).format("%Y-%m-%d").to_string();
            prop_assert!(!is_eligible(&complete(&air), 0, &now));
        }

        #[test]
        fn prop_complete_past_episodes_after_epoch_eligible(days_back in 0i64..400, hour in 0u32..24) {
            let now = at("2024-06-15", hour, 0);
            let air_date = now.date_naive() - Duration::days(days_back);
            let air = air_date.format("%Y-%m-%d").to_string();
            let epoch = Utc.from_utc_datetime(&air_date.and_hms_opt(0, 0, 0).unwrap()).timestamp();
            prop_assert!(is_eligible(&complete(&air), epoch, &now));
        }
    }
}
