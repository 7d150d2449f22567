//! # Pending-Request Index
//!
//! Purpose: Track every in-flight request by correlation token so that an
//! out-of-order response can be routed back to its completion.
//!
//! ## Design Principles
//! 1. **Exactly Once**: A request enters the index once at issue time and leaves
//!    it once, by response, fault, or rollback. Inserting over a live token is
//!    refused, never overwritten.
//! 2. **Hash Lookup**: Tokens are dense and unordered on the response path, so a
//!    `HashMap` gives O(1) insert/lookup/remove. Ordered traversal is only
//!    needed when faulting, where entries are sorted by token on the way out.
//! 3. **Owned Records**: Removing a record hands ownership (completion and
//!    context) to the caller, which then retires it.

use std::collections::HashMap;
use std::time::Instant;

use emc_common::{KeyBuf, Opcode, ProtocolViolation, Token};

use crate::completion::Completion;

/// One in-flight request.
#[derive(Debug)]
pub(crate) struct PendingRequest<U, C> {
    pub(crate) token: Token,
    /// Opcode that was sent; the response must echo it.
    pub(crate) opcode: Opcode,
    /// Index of the host the request was routed to.
    pub(crate) host: usize,
    /// Handle on the transformed key, for fault replies.
    pub(crate) key: KeyBuf,
    pub(crate) issued_at: Instant,
    pub(crate) completion: Completion<U, C>,
    pub(crate) ctx: C,
}

/// Token-keyed index of in-flight requests.
pub(crate) struct PendingIndex<U, C> {
    map: HashMap<Token, PendingRequest<U, C>>,
}

impl<U, C> PendingIndex<U, C> {
    pub(crate) fn new() -> Self {
        PendingIndex {
            map: HashMap::new(),
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    #[inline]
    pub(crate) fn contains(&self, token: Token) -> bool {
        self.map.contains_key(&token)
    }

    /// Makes room for one more record without aborting on allocation failure.
    pub(crate) fn try_reserve_one(&mut self) -> bool {
        self.map.try_reserve(1).is_ok()
    }

    /// Inserts a record, refusing to replace a live token.
    ///
    /// On collision the new record is dropped and the existing one is kept.
    pub(crate) fn insert(
        &mut self,
        request: PendingRequest<U, C>,
    ) -> Result<(), ProtocolViolation> {
        let token = request.token;
        if self.map.contains_key(&token) {
            return Err(ProtocolViolation::TokenCollision(token));
        }
        self.map.insert(token, request);
        Ok(())
    }

    #[inline]
    pub(crate) fn get(&self, token: Token) -> Option<&PendingRequest<U, C>> {
        self.map.get(&token)
    }

    #[inline]
    pub(crate) fn remove(&mut self, token: Token) -> Option<PendingRequest<U, C>> {
        self.map.remove(&token)
    }

    /// Removes every record matching `pred`, ordered by token.
    pub(crate) fn take_where<F>(&mut self, mut pred: F) -> Vec<PendingRequest<U, C>>
    where
        F: FnMut(&PendingRequest<U, C>) -> bool,
    {
        let mut tokens: Vec<Token> = self
            .map
            .values()
            .filter(|request| pred(request))
            .map(|request| request.token)
            .collect();
        tokens.sort_unstable();
        tokens
            .into_iter()
            .filter_map(|token| self.map.remove(&token))
            .collect()
    }

    /// Removes every record, ordered by token.
    pub(crate) fn take_all(&mut self) -> Vec<PendingRequest<U, C>> {
        let mut drained: Vec<_> = self.map.drain().map(|(_, request)| request).collect();
        drained.sort_unstable_by_key(|request| request.token);
        drained
    }
}
