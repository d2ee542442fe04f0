use seedcore_events::TorrentState;

use crate::engine::{EngineActivity, EngineStatusBundle};

/// Resolve an engine status bundle to a [`TorrentState`], following the
/// ordered priority rules of `capture_snapshot`. Pure and total: every
/// bundle maps to exactly one state.
#[must_use]
pub fn resolve_state(status: &EngineStatusBundle) -> TorrentState {
    if status.error_code != 0 {
        return TorrentState::Error;
    }
    if status.paused && !status.auto_managed {
        return TorrentState::Paused;
    }
    if status.paused && status.auto_managed {
        return TorrentState::Queued;
    }
    match status.activity {
        EngineActivity::CheckingFiles | EngineActivity::CheckingResume => TorrentState::Checking,
        EngineActivity::DownloadingMetadata => TorrentState::Metadata,
        EngineActivity::Downloading => {
            if status.download_speed < 1024 && status.num_seeds > 0 {
                TorrentState::Stalled
            } else {
                TorrentState::Downloading
            }
        }
        EngineActivity::Finished => TorrentState::Completed,
        EngineActivity::Seeding => TorrentState::Seeding,
        EngineActivity::Other => TorrentState::Downloading,
    }
}

/// Derive the ratio field: `total_uploaded / total_downloaded`, 0 if
/// nothing has been downloaded yet.
#[must_use]
pub fn derive_ratio(total_uploaded: u64, total_downloaded: u64) -> f64 {
    if total_downloaded == 0 {
        0.0
    } else {
        total_uploaded as f64 / total_downloaded as f64
    }
}

/// Derive the ETA field, in seconds: `(wanted - completed) / download_rate`,
/// 0 if the rate is zero or negative (already zero since rates are
/// unsigned, but the check also covers the completed case).
#[must_use]
pub fn derive_eta(total_wanted: u64, completed_size: u64, download_speed: u64) -> u64 {
    if download_speed == 0 || completed_size >= total_wanted {
        0
    } else {
        (total_wanted - completed_size) / download_speed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> EngineStatusBundle {
        EngineStatusBundle {
            name: "test".into(),
            save_path: "/tmp".into(),
            has_metadata: true,
            error_code: 0,
            error_message: None,
            paused: false,
            auto_managed: true,
            activity: EngineActivity::Downloading,
            total_size: 100,
            completed_size: 50,
            total_wanted: 100,
            download_speed: 2048,
            upload_speed: 0,
            total_downloaded: 50,
            total_uploaded: 0,
            num_seeds: 1,
            num_peers: 2,
            num_connections: 3,
        }
    }

    #[test]
    fn error_code_wins_over_everything_else() {
        let mut status = base();
        status.error_code = 42;
        status.paused = true;
        assert_eq!(resolve_state(&status), TorrentState::Error);
    }

    #[test]
    fn paused_and_not_auto_managed_is_paused() {
        let mut status = base();
        status.paused = true;
        status.auto_managed = false;
        assert_eq!(resolve_state(&status), TorrentState::Paused);
    }

    #[test]
    fn paused_and_auto_managed_is_queued() {
        let mut status = base();
        status.paused = true;
        status.auto_managed = true;
        assert_eq!(resolve_state(&status), TorrentState::Queued);
    }

    #[test]
    fn checking_files_or_resume_is_checking() {
        let mut status = base();
        status.activity = EngineActivity::CheckingFiles;
        assert_eq!(resolve_state(&status), TorrentState::Checking);
        status.activity = EngineActivity::CheckingResume;
        assert_eq!(resolve_state(&status), TorrentState::Checking);
    }

    #[test]
    fn downloading_metadata_is_metadata() {
        let mut status = base();
        status.activity = EngineActivity::DownloadingMetadata;
        assert_eq!(resolve_state(&status), TorrentState::Metadata);
    }

    #[test]
    fn slow_download_with_seeds_is_stalled() {
        let mut status = base();
        status.download_speed = 500;
        status.num_seeds = 1;
        assert_eq!(resolve_state(&status), TorrentState::Stalled);
    }

    #[test]
    fn slow_download_without_seeds_is_not_stalled() {
        let mut status = base();
        status.download_speed = 500;
        status.num_seeds = 0;
        assert_eq!(resolve_state(&status), TorrentState::Downloading);
    }

    #[test]
    fn fast_download_is_downloading() {
        let status = base();
        assert_eq!(resolve_state(&status), TorrentState::Downloading);
    }

    #[test]
    fn finished_is_completed() {
        let mut status = base();
        status.activity = EngineActivity::Finished;
        assert_eq!(resolve_state(&status), TorrentState::Completed);
    }

    #[test]
    fn seeding_is_seeding() {
        let mut status = base();
        status.activity = EngineActivity::Seeding;
        assert_eq!(resolve_state(&status), TorrentState::Seeding);
    }

    #[test]
    fn other_activity_falls_back_to_downloading() {
        let mut status = base();
        status.activity = EngineActivity::Other;
        assert_eq!(resolve_state(&status), TorrentState::Downloading);
    }

    #[test]
    fn ratio_is_zero_when_nothing_downloaded() {
        assert!((derive_ratio(500, 0) - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn ratio_divides_uploaded_by_downloaded() {
        assert!((derive_ratio(50, 100) - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn eta_is_zero_when_rate_is_zero() {
        assert_eq!(derive_eta(100, 50, 0), 0);
    }

    #[test]
    fn eta_is_zero_when_already_complete() {
        assert_eq!(derive_eta(100, 100, 10), 0);
    }

    #[test]
    fn eta_divides_remaining_by_rate() {
        assert_eq!(derive_eta(100, 50, 10), 5);
    }
}
