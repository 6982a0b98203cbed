use controller_store::models::ReportRunStatus;
use serde::Serialize;

/// One unit of data pushed to a run's subscribers (§4.6 "Stream
/// subscription"). Tagged so a client can dispatch on `type` without a
/// separate framing layer.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamFrame {
	Output { data: String },
	Complete { status: ReportRunStatus, exit_code: Option<i32> },
}
