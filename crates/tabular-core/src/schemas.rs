//! Record files used by the pipeline

use crate::row::Row;
use crate::schema::{DefaultValue, FieldSpec, FieldType, RawRow, Schema};
use crate::table::{CellValue, Table};

const BIDS_SUBJECT_PREFIX: &str = "sub-";
const BIDS_SESSION_PREFIX: &str = "ses-";

/// Participants and visits expected in a study
pub struct Manifest;

pub type ManifestTable = Table<Manifest>;
pub type ManifestRow = Row<Manifest>;

impl Manifest {
    pub const PARTICIPANT_ID: &'static str = "participant_id";
    pub const VISIT_ID: &'static str = "visit_id";
    pub const SESSION_ID: &'static str = "session_id";
    pub const DATATYPE: &'static str = "datatype";
}

impl Schema for Manifest {
    const TABLE_NAME: &'static str = "Manifest";
    const ROW_NAME: &'static str = "ManifestRow";
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::required(Self::PARTICIPANT_ID, FieldType::String),
        FieldSpec::required(Self::VISIT_ID, FieldType::String),
        FieldSpec::optional(Self::SESSION_ID, FieldType::String, DefaultValue::Null),
        FieldSpec::optional(Self::DATATYPE, FieldType::List, DefaultValue::EmptyList),
    ];
    const INDEX_COLS: &'static [&'static str] = &[Self::PARTICIPANT_ID, Self::VISIT_ID];

    /// Ids are stored without their BIDS prefixes
    fn before_fields(mut row: RawRow) -> RawRow {
        strip_prefix(&mut row, Self::PARTICIPANT_ID, BIDS_SUBJECT_PREFIX);
        strip_prefix(&mut row, Self::SESSION_ID, BIDS_SESSION_PREFIX);
        row
    }
}

/// Per-session progress through DICOM reorganization and BIDS conversion
pub struct CurationStatus;

pub type CurationStatusTable = Table<CurationStatus>;
pub type CurationStatusRow = Row<CurationStatus>;

impl CurationStatus {
    pub const PARTICIPANT_ID: &'static str = "participant_id";
    pub const SESSION_ID: &'static str = "session_id";
    pub const PARTICIPANT_DICOM_DIR: &'static str = "participant_dicom_dir";
    pub const IN_PRE_REORG: &'static str = "in_pre_reorg";
    pub const IN_POST_REORG: &'static str = "in_post_reorg";
    pub const IN_BIDS: &'static str = "in_bids";
}

impl Schema for CurationStatus {
    const TABLE_NAME: &'static str = "CurationStatus";
    const ROW_NAME: &'static str = "CurationStatusRow";
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::required(Self::PARTICIPANT_ID, FieldType::String),
        FieldSpec::required(Self::SESSION_ID, FieldType::String),
        FieldSpec::optional(
            Self::PARTICIPANT_DICOM_DIR,
            FieldType::String,
            DefaultValue::Null,
        ),
        FieldSpec::optional(
            Self::IN_PRE_REORG,
            FieldType::Boolean,
            DefaultValue::Boolean(false),
        ),
        FieldSpec::optional(
            Self::IN_POST_REORG,
            FieldType::Boolean,
            DefaultValue::Boolean(false),
        ),
        FieldSpec::optional(Self::IN_BIDS, FieldType::Boolean, DefaultValue::Boolean(false)),
    ];
    const INDEX_COLS: &'static [&'static str] = &[Self::PARTICIPANT_ID, Self::SESSION_ID];

    /// The DICOM directory defaults to the participant id
    fn before_fields(mut row: RawRow) -> RawRow {
        if row.contains_key(Self::PARTICIPANT_DICOM_DIR) {
            return row;
        }
        let derived = match row.get(Self::PARTICIPANT_ID) {
            Some(CellValue::String(id)) => Some(id.clone()),
            _ => None,
        };
        if let Some(id) = derived {
            row.insert(
                Self::PARTICIPANT_DICOM_DIR.to_string(),
                CellValue::String(id),
            );
        }
        row
    }
}

fn strip_prefix(row: &mut RawRow, field: &str, prefix: &str) {
    if let Some(CellValue::String(value)) = row.get_mut(field) {
        if let Some(stripped) = value.strip_prefix(prefix) {
            *value = stripped.to_string();
        }
    }
}
