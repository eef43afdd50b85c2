//! Implementations for the LaneDet state structure

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use image::RgbImage;
use log::{debug, info};

// Internal
use super::{
    EdgePipeline, LaneDetError, LaneDetector, LaneEstimate, Params, PipelineKind, StatusReport,
    WindowPipeline,
};
use util::{
    archive::{ArchiveError, Archived, Archiver},
    module::State,
    params,
    session::Session,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Lane detection module state
#[derive(Default)]
pub struct LaneDet {
    pub(crate) params: Params,

    detector: Option<Box<dyn LaneDetector + Send>>,

    pub(crate) report: StatusReport,
    arch_report: Archiver,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl LaneDet {
    /// Create a lane detector directly from parameters, without archiving.
    pub fn from_params(params: Params) -> Result<Self, LaneDetError> {
        params.are_valid()?;

        let detector = build_detector(&params);

        Ok(Self {
            params,
            detector: Some(detector),
            ..Default::default()
        })
    }

    pub fn params(&self) -> &Params {
        &self.params
    }
}

impl State for LaneDet {
    type InitData = &'static str;
    type InitError = LaneDetError;

    type InputData = RgbImage;
    type OutputData = LaneEstimate;
    type StatusReport = StatusReport;
    type ProcError = LaneDetError;

    /// Initialise the LaneDet module.
    ///
    /// Expected init data is the path to the parameter file
    fn init(&mut self, init_data: Self::InitData, session: &Session) -> Result<(), Self::InitError> {
        let params: Params = params::load(init_data)?;
        params.are_valid()?;

        info!("LaneDet using the {:?} pipeline", params.pipeline);
        debug!("LaneDet parameters: {:#?}", params);

        self.detector = Some(build_detector(&params));
        self.params = params;

        self.arch_report = Archiver::from_path(session, "lane_det/status_report.csv")?;

        Ok(())
    }

    /// Estimate the lane geometry in the given frame.
    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        let detector = self
            .detector
            .as_mut()
            .ok_or(LaneDetError::NotInitialised)?;

        let estimate = detector.estimate(input_data);
        self.report = detector.report();

        Ok((estimate, self.report))
    }
}

impl Archived for LaneDet {
    fn write(&mut self) -> Result<(), ArchiveError> {
        self.arch_report.serialise(self.report)
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn build_detector(params: &Params) -> Box<dyn LaneDetector + Send> {
    match params.pipeline {
        PipelineKind::Edge => Box::new(EdgePipeline::new(params.edge.clone(), params.overlay)),
        PipelineKind::Window => {
            Box::new(WindowPipeline::new(params.window.clone(), params.overlay))
        }
    }
}
