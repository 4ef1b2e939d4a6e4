//! Echo lookback: choose which recent message to repeat back in caps.
//!
//! The window is the triggering keyword followed by the messages posted just
//! before it, newest first, [`LOOKBACK_WINDOW`] in total. A window that does
//! not start at the trigger is rejected. Position 2 is the
//! repeat candidate. Position 3 is only consulted when position 2 was posted
//! by an automation account (typically our own previous echo) while the
//! chain from the last echo is still open: a keyword there repeats the last
//! echoed message again.

use hat_core::IncomingMessage;

use crate::KeywordSet;

/// Number of channel messages inspected per trigger, the trigger included.
pub const LOOKBACK_WINDOW: usize = 3;

/// Chain state carried between scans.
#[derive(Debug, Clone, Default)]
pub struct LookbackScanner {
    chained: bool,
    last_repeated: Option<IncomingMessage>,
}

impl LookbackScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_chained(&self) -> bool {
        self.chained
    }

    pub fn last_repeated(&self) -> Option<&IncomingMessage> {
        self.last_repeated.as_ref()
    }

    /// Remembers the message that was actually echoed and opens the chain.
    pub fn remember_repeated(&mut self, message: IncomingMessage) {
        self.last_repeated = Some(message);
        self.chained = true;
    }

    /// Walks `window` (newest first, starting at `trigger`) and returns the
    /// message to echo, if any. The chain only opens through
    /// [`Self::remember_repeated`]; an invalid candidate closes it.
    pub fn scan(
        &mut self,
        trigger: &IncomingMessage,
        window: &[IncomingMessage],
        keywords: &KeywordSet,
    ) -> Option<IncomingMessage> {
        if window.first().map(|first| first.id) != Some(trigger.id) {
            return None;
        }
        for (position, candidate) in window.iter().take(LOOKBACK_WINDOW).enumerate() {
            match position {
                0 => continue,
                1 => {
                    if candidate.flags.from_automation {
                        continue;
                    }
                    if is_repeat_candidate(trigger, candidate, keywords) {
                        return Some(candidate.clone());
                    }
                    self.chained = false;
                }
                2 if self.chained => {
                    if keywords.contains(&candidate.content) {
                        return self.last_repeated.clone();
                    }
                    return None;
                }
                _ => {}
            }
        }
        None
    }
}

/// Position-2 rules: someone else's plain-text, non-keyword message.
pub fn is_repeat_candidate(
    trigger: &IncomingMessage,
    candidate: &IncomingMessage,
    keywords: &KeywordSet,
) -> bool {
    candidate.author_id != trigger.author_id
        && !candidate.flags.from_automation
        && !keywords.contains(&candidate.content)
        && !candidate.flags.has_rich_content()
}

/// Renders the echo reply for `selected`, shouting when the trigger shouted.
pub fn format_echo(trigger: &IncomingMessage, selected: &IncomingMessage) -> String {
    let prefix = if trigger.is_all_caps() {
        "THEY SAID"
    } else {
        "They said"
    };
    format!("{prefix} **{}**", selected.content.to_uppercase())
}
