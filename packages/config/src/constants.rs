// ABOUTME: Environment variable name constants
// ABOUTME: Centralized definitions of all environment variable names used across MarketWise

// Server Configuration
pub const MARKETWISE_HOST: &str = "MARKETWISE_HOST";
pub const MARKETWISE_PORT: &str = "MARKETWISE_PORT";
pub const PORT: &str = "PORT"; // Legacy

// CORS Configuration
pub const MARKETWISE_CORS_ORIGIN: &str = "MARKETWISE_CORS_ORIGIN";

// Database
pub const MARKETWISE_DATABASE_URL: &str = "MARKETWISE_DATABASE_URL";

// Prompt templates
pub const MARKETWISE_PROMPTS_DIR: &str = "MARKETWISE_PROMPTS_DIR";
pub const MARKETWISE_RESPONSE_LANGUAGE: &str = "MARKETWISE_RESPONSE_LANGUAGE";

// Questionnaire engine timing
pub const MARKETWISE_PERSIST_TIMEOUT_MS: &str = "MARKETWISE_PERSIST_TIMEOUT_MS";
pub const MARKETWISE_GENERATION_TIMEOUT_SECS: &str = "MARKETWISE_GENERATION_TIMEOUT_SECS";

// AI Service
pub const ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";
pub const ANTHROPIC_MODEL: &str = "ANTHROPIC_MODEL";
pub const MARKETWISE_HTTP_REQUEST_TIMEOUT_SECS: &str = "MARKETWISE_HTTP_REQUEST_TIMEOUT_SECS";
pub const MARKETWISE_HTTP_CONNECT_TIMEOUT_SECS: &str = "MARKETWISE_HTTP_CONNECT_TIMEOUT_SECS";

// Defaults
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 4001;
pub const DEFAULT_DATABASE_URL: &str = "sqlite://marketwise.db";
pub const DEFAULT_CORS_ORIGIN: &str = "http://localhost:5173";
pub const DEFAULT_RESPONSE_LANGUAGE: &str = "English";
pub const DEFAULT_PERSIST_TIMEOUT_MS: u64 = 3_000;
pub const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 120;

// Identity header set by the upstream auth layer
pub const USER_ID_HEADER: &str = "x-user-id";
