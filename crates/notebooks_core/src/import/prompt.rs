//! Cross-thread conflict prompt hand-off.
//!
//! The import runs on a background thread; the operator is asked on the
//! interactive thread. [`ChannelDecisionProvider`] lives on the import side
//! and blocks on each conflict until [`PromptResponder`] answers on the
//! interactive side.
//!
//! # Invariants
//! - At most one prompt is in flight: the provider waits for the reply before
//!   returning.
//! - A vanished responder (dropped receiver or reply) is read as `CancelAll`.

use crate::import::policy::{ConflictDecision, ConflictPrompt, DecisionProvider};
use log::warn;
use std::sync::mpsc::{self, Receiver, SyncSender};

/// One outstanding question together with its reply slot.
pub struct PendingPrompt {
    prompt: ConflictPrompt,
    reply: SyncSender<ConflictDecision>,
}

impl PendingPrompt {
    pub fn prompt(&self) -> &ConflictPrompt {
        &self.prompt
    }

    /// Sends the operator's answer back to the import thread.
    pub fn answer(self, decision: ConflictDecision) {
        // The import thread may already be gone after a cancellation.
        let _ = self.reply.send(decision);
    }
}

/// Import-side provider; blocks on every conflict.
pub struct ChannelDecisionProvider {
    requests: SyncSender<PendingPrompt>,
}

/// Interactive-side end of the prompt channel.
pub struct PromptResponder {
    requests: Receiver<PendingPrompt>,
}

/// Creates a connected provider/responder pair.
pub fn prompt_channel() -> (ChannelDecisionProvider, PromptResponder) {
    let (requests_tx, requests_rx) = mpsc::sync_channel(0);
    (
        ChannelDecisionProvider {
            requests: requests_tx,
        },
        PromptResponder {
            requests: requests_rx,
        },
    )
}

impl DecisionProvider for ChannelDecisionProvider {
    fn decide(&mut self, prompt: &ConflictPrompt) -> ConflictDecision {
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        let pending = PendingPrompt {
            prompt: prompt.clone(),
            reply: reply_tx,
        };
        if self.requests.send(pending).is_err() {
            warn!("event=import_prompt module=import status=error error_code=responder_gone");
            return ConflictDecision::cancel();
        }
        reply_rx.recv().unwrap_or_else(|_| {
            warn!("event=import_prompt module=import status=error error_code=reply_dropped");
            ConflictDecision::cancel()
        })
    }
}

impl PromptResponder {
    /// Blocks until the next prompt arrives, or returns `None` once the import
    /// side has finished.
    pub fn next_prompt(&self) -> Option<PendingPrompt> {
        self.requests.recv().ok()
    }

    /// Answers prompts with `answer` until the import side finishes.
    pub fn serve(&self, mut answer: impl FnMut(&ConflictPrompt) -> ConflictDecision) {
        while let Some(pending) = self.next_prompt() {
            let decision = answer(pending.prompt());
            pending.answer(decision);
        }
    }
}
