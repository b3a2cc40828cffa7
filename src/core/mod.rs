pub mod completion;
pub mod detect;
pub mod dialogue;
pub mod prompts;
pub mod synthesis;

// Re-export commonly used types for convenience
pub use completion::{
    CompletionError, CompletionProvider, CompletionResult, OpenAICompletion, Role, Turn,
};
pub use detect::{
    BoundingBox, Detection, DetectionOutcome, DetectorError, DetectorResult, FALLBACK_CANVAS,
    HttpDetector, NormalizedBox, ObjectDetector,
};
pub use dialogue::{DialogueEngine, DialogueError, DialogueResult};
pub use prompts::{DEFAULT_PROMPT, PersonaPrompts, UNBOUND_PERSONA};
pub use synthesis::{OpenAISpeech, SpeechSynthesizer, SynthesisError, SynthesisResult};
