// ABOUTME: Text generation service integration
// ABOUTME: Anthropic API client behind the TextGenerator trait used by insight generation

pub mod service;

pub use service::{
    parse_json_response, AIResponse, AIService, AIServiceConfig, AIServiceError,
    AIServiceResult, GenerationRequest, TextGenerator, Usage,
};
