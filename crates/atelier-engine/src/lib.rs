mod controller;
mod conversation;
mod gemini;
mod generation;
mod intake;

pub use controller::{
    SessionController, ASSISTANT_GREETING, CHAT_APOLOGY, LOOK_FAILURE_MESSAGE,
    POSE_FAILURE_MESSAGE,
};
pub use conversation::{ConversationClient, DryrunConversationClient, GeminiConversationClient};
pub use gemini::{
    is_missing_payload_error, is_transport_error, NoImagePayload, DEFAULT_IMAGE_MODEL,
    DEFAULT_TEXT_MODEL,
};
pub use generation::{DryrunGenerationClient, GeminiGenerationClient, GenerationClient};
pub use intake::{read_image, read_image_batch, DEFAULT_BATCH_TIMEOUT};
