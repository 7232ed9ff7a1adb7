pub mod error;
pub mod manager;
pub mod recognizer;
pub mod segment;
pub mod types;
pub mod wav;

pub use error::{RecognitionError, VoiceError};
pub use manager::{JoinOutcome, JoinRequest, LeaveOutcome, VoiceManager};
pub use recognizer::{recognizer_from_config, GoogleSpeech, SpeechBackend, WhisperSpeech};
pub use segment::UtteranceSegmenter;
pub use types::{
    LanguagePrompt, Recognition, SpeechRecognizer, Utterance, UtteranceSource, VoiceConnector,
};
