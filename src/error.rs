use thiserror::Error;

/// Errors raised while loading, aggregating or presenting sales data
///
/// Every variant is meant to be caught at the boundary of one computation
/// pass and turned into a message with [`DashboardError::user_message`].
#[derive(Debug, Error)]
pub enum DashboardError {
    /// One or more required columns are absent from the source header
    #[error("missing required column(s): {}", missing.join(", "))]
    Schema {
        missing: Vec<String>,
        found: Vec<String>,
    },

    /// A date or numeric field could not be coerced to its type
    #[error("row {row}, column '{column}': cannot read '{value}' ({reason})")]
    Parse {
        row: usize,
        column: String,
        value: String,
        reason: String,
    },

    /// A ratio was requested over a zero denominator
    #[error("ratio undefined: {0} is zero")]
    DivisionUndefined(&'static str),

    /// The face-match collaborator denied access
    #[error("access denied: {0}")]
    AuthenticationFailure(String),

    /// The input file or an external collaborator is missing
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// A request named something that does not exist or sent an unreadable body
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("rendering failed: {0}")]
    Render(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DashboardError {
    /// Message suitable for showing to the person using the dashboard
    pub fn user_message(&self) -> String {
        match self {
            DashboardError::Schema { missing, found } => format!(
                "The spreadsheet is missing the column(s) {}. Columns found: {}.",
                missing.join(", "),
                if found.is_empty() {
                    "none".to_string()
                } else {
                    found.join(", ")
                }
            ),
            DashboardError::Parse {
                row,
                column,
                value,
                reason,
            } => format!(
                "Row {} has an invalid value '{}' in column '{}': {}.",
                row, value, column, reason
            ),
            DashboardError::DivisionUndefined(_) => "N/A".to_string(),
            DashboardError::AuthenticationFailure(reason) => {
                format!("Access denied: {}.", reason)
            }
            DashboardError::SourceUnavailable(what) => {
                format!("Data source not available: {}.", what)
            }
            DashboardError::BadRequest(msg) => format!("Invalid request: {}.", msg),
            DashboardError::Config(msg) => format!("Configuration problem: {}.", msg),
            DashboardError::Render(msg) => format!("Could not render output: {}.", msg),
            DashboardError::Io(e) => format!("File error: {}.", e),
        }
    }

    /// Whether the error denies access to the manager view
    pub fn is_access_denied(&self) -> bool {
        matches!(
            self,
            DashboardError::AuthenticationFailure(_) | DashboardError::SourceUnavailable(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DashboardError>;
