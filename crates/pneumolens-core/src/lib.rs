pub mod answer;
pub mod corpus;
pub mod prediction;

pub use answer::Answer;
pub use corpus::{REFERENCE_CORPUS, corpus_len};
pub use prediction::{DECISION_THRESHOLD, Label, Prediction, sigmoid};
