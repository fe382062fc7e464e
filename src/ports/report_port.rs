//! Report output port.

use crate::domain::error::PortoptError;
use crate::domain::pipeline::PortfolioAnalysis;
use std::path::Path;

/// Port for persisting a finished analysis. Implementations only consume
/// computed data.
pub trait ReportPort {
    fn write(&self, analysis: &PortfolioAnalysis, output_dir: &Path) -> Result<(), PortoptError>;
}
