//! Accumulated output of one chat session.

use crate::protocol::Fragment;
use crate::splitter::{self, Segment};

/// Label the assistant's turn is introduced with.
pub const ASSISTANT_LABEL: &str = "FastGPT";

/// Separator placed between consecutive code fragments.
const CODE_SEPARATOR: &str = "\n\n";

/// The two growing output strings: prose (rendered through the splitter) and
/// code (rendered verbatim). Both only grow until [`Conversation::clear`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversation {
    prose: String,
    code: String,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prose(&self) -> &str {
        &self.prose
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn is_empty(&self) -> bool {
        self.prose.is_empty() && self.code.is_empty()
    }

    /// Echo a submitted prompt into the prose pane and open the reply.
    pub fn begin_turn(&mut self, prompt: &str) {
        if !self.prose.is_empty() {
            self.prose.push_str("\n\n");
        }
        self.prose.push_str("User: \n");
        self.prose.push_str(prompt);
        self.prose.push_str("\n\n");
        self.prose.push_str(ASSISTANT_LABEL);
        self.prose.push_str(": \n");
    }

    pub fn apply(&mut self, fragment: Fragment) {
        match fragment {
            Fragment::Code(code) => {
                if !self.code.is_empty() {
                    self.code.push_str(CODE_SEPARATOR);
                }
                self.code.push_str(&code);
            }
            Fragment::Prose(text) | Fragment::Raw(text) => self.prose.push_str(&text),
        }
    }

    /// Reset both accumulators. The connection is not touched.
    pub fn clear(&mut self) {
        self.prose.clear();
        self.code.clear();
    }

    /// Render-ready segments of the prose, re-derived on every call.
    pub fn segments(&self) -> Vec<Segment<'_>> {
        splitter::split(&self.prose)
    }
}
