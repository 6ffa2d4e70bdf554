//! One remote client's session state.
//!
//! A session buffers raw packet bodies as they arrive on the receive path
//! (append-only, never blocking the listener) and translates them into at
//! most one ready-to-dispatch [`ActionEvent`] during the maintenance
//! sweep. It also caches the held-button and pointer state the host polls
//! through the query surface, and tracks liveness for eviction.

use crate::config::ServerConfig;
use crate::dispatch::ActionEvent;
use log::info;
use shared::{ActionKind, PacketBody};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Result of a held-button query.
#[derive(Debug, Clone, PartialEq)]
pub struct ButtonCode {
    pub code: u32,
    pub amount: f32,
    pub axis: bool,
    pub joystick: bool,
}

#[derive(Debug)]
struct HeldButton {
    map_name: String,
    code: u32,
    amount: f32,
    axis: bool,
    joystick: bool,
}

/// Session state for one remote endpoint.
#[derive(Debug)]
pub struct Session {
    addr: SocketAddr,
    device_name: String,
    last_seen: Instant,
    timeout: Duration,
    alive: bool,
    raw_events: VecDeque<PacketBody>,
    ready_action: Option<ActionEvent>,
    held_button: Option<HeldButton>,
    mouse: Option<(f32, f32)>,
}

impl Session {
    pub fn new(addr: SocketAddr, timeout: Duration) -> Self {
        Self {
            addr,
            device_name: String::new(),
            last_seen: Instant::now(),
            timeout,
            alive: true,
            raw_events: VecDeque::new(),
            ready_action: None,
            held_button: None,
            mouse: None,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Device name from the last Hello, or the address when the client
    /// never introduced itself.
    pub fn name(&self) -> String {
        if self.device_name.is_empty() {
            self.addr.to_string()
        } else {
            self.device_name.clone()
        }
    }

    /// Receive-path ingestion. Only appends and refreshes liveness;
    /// translation is deferred to [`Session::process_events`] so the
    /// socket is back in service as quickly as possible.
    pub fn add_packet(&mut self, body: PacketBody) {
        self.last_seen = Instant::now();
        self.raw_events.push_back(body);
    }

    /// Translates buffered bodies until the single action slot fills or
    /// the buffer runs dry. Bodies that do not produce an action (state
    /// updates, liveness, teardown) are consumed along the way.
    pub fn process_events(&mut self) {
        while self.ready_action.is_none() {
            let Some(body) = self.raw_events.pop_front() else {
                break;
            };
            match body {
                PacketBody::Hello { device_name } => {
                    info!("Client from {} identifies as \"{}\"", self.addr, device_name);
                    self.device_name = device_name;
                }
                PacketBody::Ping => {}
                PacketBody::Bye => {
                    self.alive = false;
                }
                PacketBody::Button {
                    map_name,
                    button_name,
                    code,
                    down,
                    queue,
                    amount,
                    axis,
                    joystick,
                } => {
                    if queue {
                        // Queued buttons fire once, on press only.
                        if down {
                            self.ready_action = Some(ActionEvent::Button { name: button_name });
                        }
                    } else if down {
                        self.held_button = Some(HeldButton {
                            map_name,
                            code,
                            amount,
                            axis,
                            joystick,
                        });
                    } else {
                        self.held_button = None;
                    }
                }
                PacketBody::Mouse { x, y } => {
                    self.mouse = Some((x.clamp(0.0, 1.0), y.clamp(0.0, 1.0)));
                }
                PacketBody::Action { kind, text } => {
                    self.ready_action = Some(match kind {
                        ActionKind::ExecBuiltin => ActionEvent::ExecBuiltin { command: text },
                        ActionKind::Button => ActionEvent::Button { name: text },
                    });
                }
            }
        }
    }

    /// Hands the pending action to the dispatcher, emptying the slot.
    pub fn take_action(&mut self) -> Option<ActionEvent> {
        self.ready_action.take()
    }

    /// False once the client said Bye or stayed silent past its timeout.
    pub fn is_alive(&self) -> bool {
        self.alive && self.last_seen.elapsed() <= self.timeout
    }

    /// Applies a deferred settings change without tearing the session down.
    pub fn refresh_settings(&mut self, config: &ServerConfig) {
        self.timeout = config.session_timeout();
    }

    /// Held-button state for the given mapping, if any. Read-only; the
    /// state stays until the client releases the button.
    pub fn button_code(&self, map_name: &str) -> Option<ButtonCode> {
        let held = self.held_button.as_ref()?;
        if held.map_name != map_name || held.code == 0 {
            return None;
        }
        Some(ButtonCode {
            code: held.code,
            amount: held.amount,
            axis: held.axis,
            joystick: held.joystick,
        })
    }

    /// Last reported pointer position, if the client ever sent one.
    pub fn mouse_pos(&self) -> Option<(f32, f32)> {
        self.mouse
    }

    #[cfg(test)]
    pub(crate) fn age_by(&mut self, by: Duration) {
        self.last_seen = Instant::now() - by;
    }
}
