use crate::units::Unit;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable error contract of the engine. The variant set is the API; the
/// messages are for humans.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    Validation {
        message: String,
        field: Option<String>,
    },
    DuplicateId {
        id: String,
    },
    UnknownResource {
        id: String,
    },
    UnknownProject {
        id: String,
    },
    UnknownDepartment {
        id: String,
    },
    UnitMismatch {
        resource_id: String,
        declared: Unit,
        provided: Unit,
    },
    InvalidDecomposition {
        percentage_total: f64,
    },
    DecompositionInconsistent {
        declared: f64,
        derived: f64,
    },
    InsufficientHistory {
        required: usize,
        available: usize,
    },
    NoActiveProjects,
    UnbalancedInfeasible {
        reason: String,
    },
}

impl EngineError {
    pub fn validation(message: impl Into<String>) -> Self {
        EngineError::Validation {
            message: message.into(),
            field: None,
        }
    }

    pub fn validation_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        EngineError::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// The machine-readable kind. Hosts branch on this, never on messages.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation { .. } => "ValidationError",
            EngineError::DuplicateId { .. } => "DuplicateId",
            EngineError::UnknownResource { .. } => "UnknownResource",
            EngineError::UnknownProject { .. } => "UnknownProject",
            EngineError::UnknownDepartment { .. } => "UnknownDepartment",
            EngineError::UnitMismatch { .. } => "UnitMismatch",
            EngineError::InvalidDecomposition { .. } => "InvalidDecomposition",
            EngineError::DecompositionInconsistent { .. } => "DecompositionInconsistent",
            EngineError::InsufficientHistory { .. } => "InsufficientHistory",
            EngineError::NoActiveProjects => "NoActiveProjects",
            EngineError::UnbalancedInfeasible { .. } => "UnbalancedInfeasible",
        }
    }

    /// Process exit code for the CLI: 1 validation, 2 missing resource,
    /// 3 inconsistent decomposition.
    pub fn exit_code(&self) -> i32 {
        match self {
            EngineError::UnknownResource { .. }
            | EngineError::UnknownProject { .. }
            | EngineError::UnknownDepartment { .. } => 2,
            EngineError::DecompositionInconsistent { .. } => 3,
            _ => 1,
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        let (offending_field, offending_id) = match self {
            EngineError::Validation { field, .. } => (field.clone(), None),
            EngineError::DuplicateId { id }
            | EngineError::UnknownResource { id }
            | EngineError::UnknownProject { id }
            | EngineError::UnknownDepartment { id } => (None, Some(id.clone())),
            EngineError::UnitMismatch { resource_id, .. } => (None, Some(resource_id.clone())),
            _ => (None, None),
        };
        ErrorBody {
            kind: self.kind().to_string(),
            message: self.to_string(),
            offending_field,
            offending_id,
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Validation { message, field } => match field {
                Some(field) => write!(f, "invalid {field}: {message}"),
                None => write!(f, "{message}"),
            },
            EngineError::DuplicateId { id } => write!(f, "id '{id}' already exists"),
            EngineError::UnknownResource { id } => write!(f, "resource '{id}' not found"),
            EngineError::UnknownProject { id } => write!(f, "project '{id}' not found"),
            EngineError::UnknownDepartment { id } => write!(f, "department '{id}' not found"),
            EngineError::UnitMismatch {
                resource_id,
                declared,
                provided,
            } => write!(
                f,
                "component unit '{provided}' does not match unit '{declared}' declared by resource '{resource_id}'"
            ),
            EngineError::InvalidDecomposition { percentage_total } => write!(
                f,
                "class percentages sum to {percentage_total:.4}, expected 1.0 within 0.01"
            ),
            EngineError::DecompositionInconsistent { declared, derived } => write!(
                f,
                "declared unit price {declared:.2} and price derived from components {derived:.2} diverge beyond 1%"
            ),
            EngineError::InsufficientHistory {
                required,
                available,
            } => write!(
                f,
                "price history requires at least {required} samples, found {available}"
            ),
            EngineError::NoActiveProjects => {
                write!(f, "pro-rata allocation requires a non-empty set of active projects")
            }
            EngineError::UnbalancedInfeasible { reason } => {
                write!(f, "unbalanced pricing is infeasible: {reason}")
            }
        }
    }
}

impl std::error::Error for EngineError {}

/// Structured error surface handed to hosts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offending_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offending_id: Option<String>,
}

pub type EngineResult<T> = Result<T, EngineError>;
