pub mod complementary;

pub use complementary::{apply_deadband, AttitudeEstimator, AttitudeOutput, EstimatorDiagnostics};
