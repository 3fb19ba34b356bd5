use serde::Serialize;

use crate::services::closed_correction::NamedClosedGradeResult;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ClosedCorrectionResponse {
    pub(crate) exam_id: String,
    pub(crate) results: Vec<NamedClosedGradeResult>,
}
