//! Token-to-session registry with bounded admission.
//!
//! The registry is the single shared structure between the listener loop
//! (its only membership writer) and the host's query surface. Every
//! access happens under one exclusive lock owned by the server; nothing
//! in here blocks.
//!
//! Keys are resolved identities: the packet's embedded token when
//! non-zero, otherwise a value derived from the sender address. The two
//! derivations live in disjoint halves of the key space so a client that
//! starts sending an explicit token is never merged with its earlier
//! address-keyed session. A `BTreeMap` keeps iteration order stable,
//! which the first-match dispatch and query rules rely on.

use crate::config::ServerConfig;
use crate::dispatch::ActionEvent;
use crate::session::{ButtonCode, Session};
use log::{info, warn};
use shared::Packet;
use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Tag bit separating address-derived keys from explicit tokens.
const ADDR_KEY_TAG: u64 = 1 << 32;

/// Folds a sender address into the fallback half of the key space.
fn addr_key(addr: SocketAddr) -> u64 {
    let numeric = match addr.ip() {
        IpAddr::V4(ip) => u32::from(ip),
        IpAddr::V6(ip) => ip
            .octets()
            .chunks(4)
            .fold(0u32, |acc, chunk| {
                let mut word = [0u8; 4];
                word[..chunk.len()].copy_from_slice(chunk);
                acc ^ u32::from_be_bytes(word)
            }),
    };
    ADDR_KEY_TAG | numeric as u64
}

/// Computes the single resolved identity for a datagram.
pub fn resolve_token(packet_token: u32, addr: SocketAddr) -> u64 {
    match packet_token {
        0 => addr_key(addr),
        token => token as u64,
    }
}

/// All live sessions, keyed by resolved token.
pub struct SessionRegistry {
    sessions: BTreeMap<u64, Session>,
    max_clients: usize,
    session_timeout: Duration,
}

impl SessionRegistry {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            sessions: BTreeMap::new(),
            max_clients: config.max_clients(),
            session_timeout: config.session_timeout(),
        }
    }

    /// Routes one valid packet: existing sessions ingest it, unseen
    /// tokens are admitted while capacity allows. Returns false when the
    /// packet was discarded for capacity.
    pub fn route(&mut self, packet: Packet, addr: SocketAddr) -> bool {
        let key = resolve_token(packet.token, addr);

        if let Some(session) = self.sessions.get_mut(&key) {
            session.add_packet(packet.body);
            return true;
        }

        if self.sessions.len() >= self.max_clients {
            warn!(
                "Cannot accept client from {}, maximum client count {} reached",
                addr, self.max_clients
            );
            return false;
        }

        info!("New client session {:#x} from {}", key, addr);
        let mut session = Session::new(addr, self.session_timeout);
        session.add_packet(packet.body);
        self.sessions.insert(key, session);
        true
    }

    /// Advances every session's translation step.
    pub fn process_events(&mut self) {
        for session in self.sessions.values_mut() {
            session.process_events();
        }
    }

    /// First ready action in registry order, removed from its session.
    pub fn take_next_action(&mut self) -> Option<ActionEvent> {
        self.sessions
            .values_mut()
            .find_map(|session| session.take_action())
    }

    /// Liveness sweep: evicts dead sessions and applies a pending
    /// settings change to the survivors (and to the registry's own
    /// limits).
    pub fn sweep(&mut self, refreshed: Option<&ServerConfig>) {
        if let Some(config) = refreshed {
            self.max_clients = config.max_clients();
            self.session_timeout = config.session_timeout();
        }
        self.sessions.retain(|_, session| {
            if session.is_alive() {
                if let Some(config) = refreshed {
                    session.refresh_settings(config);
                }
                true
            } else {
                info!(
                    "Client \"{}\" from {} timed out",
                    session.name(),
                    session.addr()
                );
                false
            }
        });
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// First non-empty held-button state for the mapping, in registry
    /// order.
    pub fn button_code(&self, map_name: &str) -> Option<ButtonCode> {
        self.sessions
            .values()
            .find_map(|session| session.button_code(map_name))
    }

    /// First session reporting a pointer position, in registry order.
    pub fn mouse_pos(&self) -> Option<(f32, f32)> {
        self.sessions.values().find_map(|session| session.mouse_pos())
    }

    /// Drops every session; used on loop teardown.
    pub fn clear(&mut self) {
        self.sessions.clear();
    }

    #[cfg(test)]
    pub(crate) fn session_mut(&mut self, key: u64) -> Option<&mut Session> {
        self.sessions.get_mut(&key)
    }
}
