//! Word-by-word release of a finished answer
//!
//! The agent returns its whole answer at once; the emitter replays it one
//! whitespace-delimited word at a time so the user sees it being typed and
//! can stop it part way.

use std::time::Duration;

/// Default pause between two released words in interactive use
pub const DEFAULT_PACING: Duration = Duration::from_millis(50);

/// Result of one emission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emission {
    /// Released words joined by single spaces, plus the stop annotation
    /// when cancelled
    pub text: String,
    /// Number of words handed to the fragment callback
    pub released: usize,
    /// Number of words in the full answer
    pub total: usize,
    pub cancelled: bool,
}

/// Annotation appended when the user stops a turn before the last word.
///
/// `next` is the 1-based position of the word that was about to be released.
pub fn stop_annotation(next: usize, total: usize) -> String {
    format!("\n\n*[Generation stopped by user after {next}/{total} words]*")
}

#[derive(Debug, Clone, Copy)]
pub struct StreamEmitter {
    pacing: Duration,
}

impl StreamEmitter {
    pub fn new(pacing: Duration) -> Self {
        Self { pacing }
    }

    /// Emitter with no pause between words
    #[cfg(test)]
    pub fn immediate() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn pacing(&self) -> Duration {
        self.pacing
    }

    /// Release `full_text` word by word.
    ///
    /// `is_cancelled` is polled once before every word. `on_fragment`
    /// receives the cumulative text after every released word.
    pub async fn emit<C, F>(&self, full_text: &str, is_cancelled: C, mut on_fragment: F) -> Emission
    where
        C: Fn() -> bool,
        F: FnMut(&str),
    {
        let words: Vec<&str> = full_text.split_whitespace().collect();
        let total = words.len();
        let mut text = String::with_capacity(full_text.len());

        for (index, word) in words.iter().enumerate() {
            if is_cancelled() {
                text.push_str(&stop_annotation(index + 1, total));
                tracing::debug!(released = index, total, "Emission stopped");
                return Emission {
                    text,
                    released: index,
                    total,
                    cancelled: true,
                };
            }

            if index > 0 {
                text.push(' ');
            }
            text.push_str(word);
            on_fragment(&text);

            if !self.pacing.is_zero() && index + 1 < total {
                tokio::time::sleep(self.pacing).await;
            }
        }

        Emission {
            text,
            released: total,
            total,
            cancelled: false,
        }
    }
}
