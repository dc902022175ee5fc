use thiserror::Error;

/// Core error types for vpclab
#[derive(Debug, Error)]
pub enum Error {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// gcloud command execution failed
    #[error("gcloud error: {message}")]
    Gcloud {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    /// Input validation failed
    #[error("Validation error in {field}: {message}")]
    Validation { field: String, message: String },

    /// A walkthrough precondition does not hold
    #[error("{0}")]
    Prerequisite(String),

    /// Environment configuration is missing or invalid
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Rule file could not be loaded or saved
    #[error("Rule file error: {0}")]
    Policy(#[from] crate::core::policy::PolicyError),

    /// Internal logic error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns hints for the user, if the error has any worth showing
    pub fn translation(&self) -> Option<ErrorTranslation> {
        match self {
            Error::Gcloud { message, stderr, .. } => Some(GcloudErrorPattern::match_error(
                stderr.as_deref().unwrap_or(message),
            )),
            Error::Config(crate::config::ConfigError::MissingProjectId) => Some(
                ErrorTranslation::new("PROJECT_ID is not set")
                    .with_suggestion("export PROJECT_ID=<your-project-id>")
                    .with_suggestion("List your projects: gcloud projects list"),
            ),
            _ => None,
        }
    }
}

/// Represents a translated error with helpful context
#[derive(Debug, Clone)]
pub struct ErrorTranslation {
    pub user_message: String,
    pub suggestions: Vec<String>,
    pub help_url: Option<String>,
}

impl ErrorTranslation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            user_message: message.into(),
            suggestions: Vec::new(),
            help_url: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_help(mut self, url: impl Into<String>) -> Self {
        self.help_url = Some(url.into());
        self
    }
}

/// Database of gcloud error patterns and their translations
pub struct GcloudErrorPattern;

impl GcloudErrorPattern {
    /// Matches an error message against known patterns and returns a user-friendly translation.
    pub fn match_error(msg: &str) -> ErrorTranslation {
        let lower = msg.to_lowercase();

        // Missing gcloud
        if lower.contains("no such file") || lower.contains("command not found") {
            return ErrorTranslation::new("gcloud is not installed or not found in PATH")
                .with_suggestion("Install the Google Cloud CLI")
                .with_suggestion("Or set VPCLAB_GCLOUD_COMMAND to the gcloud binary")
                .with_help("https://cloud.google.com/sdk/docs/install");
        }

        // Authentication
        if lower.contains("you do not currently have an active account")
            || lower.contains("reauthentication")
            || lower.contains("gcloud auth login")
        {
            return ErrorTranslation::new("gcloud is not authenticated")
                .with_suggestion("Log in: gcloud auth login")
                .with_suggestion("Check the active account: gcloud auth list")
                .with_help("https://cloud.google.com/sdk/docs/authorizing");
        }

        // API not enabled
        if lower.contains("has not been used in project") || lower.contains("is disabled") {
            return ErrorTranslation::new("The Compute Engine API is not enabled for this project")
                .with_suggestion("Enable it: gcloud services enable compute.googleapis.com")
                .with_suggestion("Wait a minute after enabling before retrying")
                .with_help("https://cloud.google.com/compute/docs/reference/rest/v1");
        }

        // Permission errors
        if (lower.contains("permission") && lower.contains("denied"))
            || lower.contains("required 'compute.")
        {
            return ErrorTranslation::new("Insufficient permissions in the project")
                .with_suggestion("Check that PROJECT_ID is the project you expect")
                .with_suggestion("Ask for the Compute Network Admin role")
                .with_help("https://cloud.google.com/compute/docs/access/iam");
        }

        // Billing
        if lower.contains("billing") {
            return ErrorTranslation::new("Billing is not enabled for this project")
                .with_suggestion("Link a billing account in the Cloud Console")
                .with_help("https://cloud.google.com/billing/docs/how-to/modify-project");
        }

        // Quota
        if lower.contains("quota") {
            return ErrorTranslation::new("Project quota exceeded")
                .with_suggestion("Delete unused resources: vpclab cleanup")
                .with_suggestion("Check quotas: gcloud compute project-info describe")
                .with_help("https://cloud.google.com/compute/quotas");
        }

        // Resource already exists
        if lower.contains("already exists") {
            return ErrorTranslation::new("The resource already exists")
                .with_suggestion("A previous run probably created it")
                .with_suggestion("Remove lab resources first: vpclab cleanup --yes");
        }

        // Resource not found
        if lower.contains("was not found") || lower.contains("not found") {
            return ErrorTranslation::new("A referenced resource does not exist")
                .with_suggestion("Run the networks walkthrough first: vpclab networks --all")
                .with_suggestion("Check the zone and region variables (ZONE_1, ZONE_2, REGION)");
        }

        // Resource in use
        if lower.contains("being used by") || lower.contains("resourceinuse") {
            return ErrorTranslation::new("The resource is still in use")
                .with_suggestion("Delete dependent resources first (instances, subnets, rules)");
        }

        // Invalid argument
        if lower.contains("invalid value") || lower.contains("invalid argument") {
            return ErrorTranslation::new("gcloud rejected an argument")
                .with_suggestion("Check ZONE_1, ZONE_2 and REGION for typos")
                .with_suggestion("Run with --verbose to see the exact gcloud invocation");
        }

        // Generic fallback
        ErrorTranslation::new(format!("gcloud error: {msg}"))
            .with_suggestion("Check the detailed error message for more information")
            .with_suggestion("Run with --verbose to see the gcloud invocation")
            .with_help("https://cloud.google.com/sdk/gcloud/reference/compute")
    }
}

pub type Result<T> = std::result::Result<T, Error>;
