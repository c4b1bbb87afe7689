//! Configuration for MindTerm.
//!
//! Settings are resolved once at process start from the environment and may
//! then be overridden from the command line.  The resulting [`Config`] is an
//! immutable value handed to the client constructor; nothing reads the
//! environment after that.

use std::env;
use std::fmt;

use arrrg_derive::CommandLine;

/// Environment variable holding the provider API key.
pub const API_KEY_VAR: &str = "OPENAI_API_KEY";

/// Environment variable overriding the provider base URL.
pub const BASE_URL_VAR: &str = "OPENAI_BASE_URL";

/// Environment variable overriding the model identifier.
pub const MODEL_VAR: &str = "OPENAI_MODEL";

/// Base URL used when `OPENAI_BASE_URL` is unset.
pub const DEFAULT_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";

/// Model used when `OPENAI_MODEL` is unset.
pub const DEFAULT_MODEL: &str = "qwen-plus";

/// Command-line arguments for the mindterm binary.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct MindTermArgs {
    /// Model to use for completions.
    #[arrrg(optional, "Model to use (default: $OPENAI_MODEL or qwen-plus)", "MODEL")]
    pub model: Option<String>,

    /// Base URL of the OpenAI-compatible endpoint.
    #[arrrg(optional, "Provider base URL (default: $OPENAI_BASE_URL)", "URL")]
    pub base_url: Option<String>,

    /// Render each response once instead of streaming it.
    #[arrrg(flag, "Wait for the full response instead of streaming it")]
    pub no_stream: bool,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Resolved configuration for a MindTerm process.
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    /// API key for the provider; required for a usable configuration.
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible endpoint.
    pub base_url: String,

    /// Model identifier sent with every request.
    pub model: String,

    /// Whether responses are streamed into a live region.
    pub stream: bool,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,
}

impl Config {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Resolves the configuration through `lookup` instead of the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            api_key: lookup(API_KEY_VAR),
            base_url: lookup(BASE_URL_VAR).unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: lookup(MODEL_VAR).unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            stream: true,
            use_color: true,
        }
    }

    /// Returns true exactly when an API key is present and non-empty.
    pub fn validate(&self) -> bool {
        self.api_key.as_deref().is_some_and(|key| !key.is_empty())
    }

    /// Applies command-line overrides.
    pub fn with_args(mut self, args: MindTermArgs) -> Self {
        if let Some(model) = args.model {
            self.model = model;
        }
        if let Some(base_url) = args.base_url {
            self.base_url = base_url;
        }
        self.stream = !args.no_stream;
        self.use_color = !args.no_color;
        self
    }

    /// Sets the API key.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Chooses between streamed and single-shot responses.
    pub fn with_streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("stream", &self.stream)
            .field("use_color", &self.use_color)
            .finish()
    }
}
