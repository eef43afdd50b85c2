//! # Telemetry archive
//!
//! One [`LaneTm`] row is written per cycle into `lane_tm.csv` in the session's archive
//! directory.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{eqpt::mech::MechDems, tm::LaneTm};
use util::{
    archive::{ArchiveError, Archived, Archiver},
    session::Session,
};

use crate::lane_det::LaneGeometry;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Telemetry for the current cycle and the archive it is written to.
///
/// The default archive discards everything written to it.
#[derive(Default)]
pub struct TmArchive {
    pub tm: LaneTm,

    arch: Option<Archiver>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TmArchive {
    /// Create the telemetry archive in the given session.
    pub fn new(session: &Session) -> Result<Self, ArchiveError> {
        Ok(Self {
            tm: LaneTm::default(),
            arch: Some(Archiver::from_path(session, "lane_tm.csv")?),
        })
    }

    /// Set the telemetry for this cycle.
    pub fn record(&mut self, time: f64, geometry: &LaneGeometry, dems: &MechDems, enabled: bool) {
        self.tm = LaneTm {
            time,
            offset: geometry.offset_norm,
            heading: geometry.heading_rad,
            steer_angle: dems.steer_angle_deg,
            motor_speed: dems.motor_speed,
            confidence: geometry.confidence,
            enabled,
        };
    }
}

impl Archived for TmArchive {
    fn write(&mut self) -> Result<(), ArchiveError> {
        let tm = self.tm;
        match self.arch.as_mut() {
            Some(a) => a.serialise(tm),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_tm_rows() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session {
            session_root: dir.path().to_path_buf(),
            arch_root: dir.path().join("arch"),
            log_file_path: dir.path().join("test.log"),
        };

        let mut tm = TmArchive::new(&session).unwrap();
        tm.record(
            0.5,
            &LaneGeometry::new(0.25, 0.0, 1.0),
            &MechDems {
                steer_angle_deg: 2.0,
                motor_speed: 0.5,
            },
            true,
        );
        tm.write().unwrap();
        tm.record(1.0, &LaneGeometry::none(), &MechDems::stop(), false);
        tm.write().unwrap();

        let contents = std::fs::read_to_string(dir.path().join("arch/lane_tm.csv")).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(
            lines,
            vec![
                "time,offset,heading,steer_angle,motor_speed,confidence,enabled",
                "0.5,0.25,0.0,2.0,0.5,1.0,true",
                "1.0,0.0,0.0,0.0,0.0,0.0,false",
            ]
        );
    }

    #[test]
    fn test_default_discards() {
        let mut tm = TmArchive::default();
        tm.record(0.0, &LaneGeometry::none(), &MechDems::stop(), false);
        assert!(tm.write().is_ok());
    }
}
