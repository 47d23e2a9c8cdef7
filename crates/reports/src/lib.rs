//! `stocktake-reports`: compliance report jobs over completed audits.
//!
//! Report generation is read-only: it aggregates whatever the audit read
//! model already holds and hands back a job descriptor. Rendering and
//! delivery are external concerns referenced by the job's status and
//! download identifiers.

pub mod job;
pub mod preview;

pub use job::{
    CompletedAuditSummary, ReportFilters, ReportFormat, ReportJob, ReportJobId, ReportRequest,
    ReportStatus, ReportType, generate,
};
pub use preview::DataPreview;
