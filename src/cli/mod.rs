use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Chat LLM Provider Args ---
    /// Full URL of the OpenAI-compatible streaming chat-completions endpoint.
    #[arg(long, env = "CHAT_BASE_URL")] // No default, adapter supplies one if None
    pub chat_base_url: Option<String>,

    /// API Key for the chat provider, sent as a Bearer token.
    #[arg(long, env = "CHAT_API_KEY", default_value = "")]
    pub chat_api_key: String,

    /// Model name for chat completion (e.g., gpt-4o, gpt-4o-mini)
    #[arg(long, env = "CHAT_MODEL")] // No default, rely on adapter default if None
    pub chat_model: Option<String>,

    /// Sampling temperature passed through to the provider.
    #[arg(long, env = "CHAT_TEMPERATURE", default_value = "0.7")]
    pub chat_temperature: f32,

    // --- Conversation Args ---
    /// Number of most recent conversation messages included as context in
    /// each completion request.
    #[arg(long, env = "HISTORY_LIMIT", default_value = "12")]
    pub history_limit: usize,

    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,
}
