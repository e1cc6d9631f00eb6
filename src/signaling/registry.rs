//! Call state machine: users, pending offers and active calls.
//!
//! The registry is a plain owned aggregate. It is not synchronized itself;
//! the actor owns the only instance and feeds it one operation at a time, so
//! every operation below runs as a single critical section.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use super::messages::ServerMessage;
use super::types::{ConnectionId, UserInfo};

/// Outbound side of the transport, as seen by the registry.
///
/// Delivery is fire-and-forget: the registry never learns whether a message
/// reached its target.
pub trait Transport {
    fn send_to(&mut self, target: ConnectionId, msg: &ServerMessage);
    fn broadcast(&mut self, msg: &ServerMessage);
}

#[derive(Debug, Clone, PartialEq)]
struct User {
    display_name: String,
    /// Join sequence number; orders the roster.
    joined: u64,
}

/// A proposed, not yet accepted call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CallOffer {
    caller: ConnectionId,
    callee: ConnectionId,
}

type CallId = u64;

/// An active session. Only ever created with two members; a call whose
/// membership drops below two is deleted. Conferencing would need to revisit
/// that rule and the single-partner addressing of signals.
#[derive(Debug, Clone, PartialEq)]
struct Call {
    members: Vec<ConnectionId>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Registry {
    users: HashMap<ConnectionId, User>,
    offers: HashSet<CallOffer>,
    calls: HashMap<CallId, Call>,
    /// Which call each member belongs to; mirrors `calls`.
    memberships: HashMap<ConnectionId, CallId>,
    next_join: u64,
    next_call: CallId,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user to the roster. A repeated join renames the user and keeps
    /// their roster position.
    pub fn join(&mut self, out: &mut impl Transport, id: ConnectionId, display_name: String) {
        match self.users.get_mut(&id) {
            Some(user) => {
                info!("User {} renamed to {:?}", id, display_name);
                user.display_name = display_name;
            }
            None => {
                info!("User {} joined as {:?}", id, display_name);
                let joined = self.next_join;
                self.next_join += 1;
                self.users.insert(
                    id,
                    User {
                        display_name,
                        joined,
                    },
                );
            }
        }
        self.broadcast_roster(out);
    }

    /// Hang up, then drop the user. A second call for the same id is a no-op.
    pub fn disconnect(&mut self, out: &mut impl Transport, id: ConnectionId) {
        if !self.users.contains_key(&id) {
            debug!("Disconnect for unknown user {}", id);
            return;
        }

        self.hang_up(out, id);
        self.users.remove(&id);
        info!("User {} left", id);
        self.broadcast_roster(out);
    }

    pub fn call_user(&mut self, out: &mut impl Transport, caller: ConnectionId, callee: ConnectionId) {
        let Some(caller_info) = self.user_info(caller) else {
            debug!("Call from unknown user {} ignored", caller);
            return;
        };
        if caller == callee {
            debug!("Self-call from {} ignored", caller);
            return;
        }

        let Some(callee_info) = self.user_info(callee) else {
            out.send_to(
                caller,
                &ServerMessage::CallDeclined {
                    user: UserInfo::unknown(callee),
                    reason: "left".to_string(),
                },
            );
            return;
        };

        if callee_info.in_call {
            out.send_to(
                caller,
                &ServerMessage::CallDeclined {
                    user: callee_info,
                    reason: "busy".to_string(),
                },
            );
            return;
        }

        debug!("User {} is ringing {}", caller, callee);
        out.send_to(callee, &ServerMessage::IncomingCall { user: caller_info });
        self.offers.insert(CallOffer { caller, callee });
    }

    /// Answer the offer `caller` placed to `callee`. The checks run in a
    /// fixed order and the first one that fails ends the operation.
    pub fn answer_call(
        &mut self,
        out: &mut impl Transport,
        accept: bool,
        callee: ConnectionId,
        caller: ConnectionId,
    ) {
        let Some(callee_info) = self.user_info(callee) else {
            return;
        };

        let Some(caller_info) = self.user_info(caller) else {
            out.send_to(
                callee,
                &ServerMessage::CallEnded {
                    user: UserInfo::unknown(caller),
                    reason: "other user left".to_string(),
                },
            );
            return;
        };

        // The offer stays in place on decline; a later accept or the
        // caller's hang-up clears it.
        if !accept {
            let reason = format!("{} did not accept", callee_info.display_name);
            out.send_to(
                caller,
                &ServerMessage::CallDeclined {
                    user: callee_info,
                    reason,
                },
            );
            return;
        }

        if !self.offers.remove(&CallOffer { caller, callee }) {
            let reason = format!("{} already hung up", caller_info.display_name);
            out.send_to(
                callee,
                &ServerMessage::CallEnded {
                    user: caller_info,
                    reason,
                },
            );
            return;
        }

        if callee_info.in_call {
            let reason = format!("{} accepted someone else", callee_info.display_name);
            out.send_to(
                caller,
                &ServerMessage::CallDeclined {
                    user: callee_info,
                    reason,
                },
            );
            return;
        }

        if caller_info.in_call {
            let reason = format!("{} is in another call", caller_info.display_name);
            out.send_to(
                callee,
                &ServerMessage::CallEnded {
                    user: caller_info,
                    reason,
                },
            );
            return;
        }

        // Glare: the caller's other rings are void now. Rings the callee
        // placed stay and fail on the in-call check above if answered.
        self.offers.retain(|offer| offer.caller != caller);

        let call_id = self.next_call;
        self.next_call += 1;
        self.memberships.insert(caller, call_id);
        self.memberships.insert(callee, call_id);
        self.calls.insert(
            call_id,
            Call {
                members: vec![caller, callee],
            },
        );
        info!("Call {} started between {} and {}", call_id, caller, callee);

        let mut accepted_by = callee_info;
        accepted_by.in_call = true;
        out.send_to(caller, &ServerMessage::CallAccepted { user: accepted_by });
        self.broadcast_roster(out);
    }

    pub fn hang_up(&mut self, out: &mut impl Transport, id: ConnectionId) {
        if let Some(call_id) = self.call_of(id) {
            let user = self
                .user_info(id)
                .unwrap_or_else(|| UserInfo::unknown(id));
            let reason = format!("{} has hung up", user.display_name);

            if let Some(call) = self.calls.get_mut(&call_id) {
                for &member in call.members.iter().filter(|&&m| m != id) {
                    out.send_to(
                        member,
                        &ServerMessage::CallEnded {
                            user: user.clone(),
                            reason: reason.clone(),
                        },
                    );
                }
                call.members.retain(|&m| m != id);
            }
            self.memberships.remove(&id);

            if self.calls.get(&call_id).is_some_and(|call| call.members.len() < 2) {
                if let Some(call) = self.calls.remove(&call_id) {
                    for member in call.members {
                        self.memberships.remove(&member);
                    }
                }
                info!("Call {} ended by {}", call_id, id);
            }
        }

        self.offers.retain(|offer| offer.caller != id);
        self.broadcast_roster(out);
    }

    /// Forward `signal` from `from` to `to` if, and only if, they are two
    /// different members of the same call. Anything else is dropped without telling the sender.
    pub fn send_signal(
        &mut self,
        out: &mut impl Transport,
        from: ConnectionId,
        to: ConnectionId,
        signal: String,
    ) {
        let Some(sender) = self.user_info(from) else {
            return;
        };
        if from == to || !self.users.contains_key(&to) || !self.in_same_call(from, to) {
            debug!("Dropped signal from {} to {}", from, to);
            return;
        }

        out.send_to(to, &ServerMessage::ReceiveSignal { user: sender, signal });
    }

    /// Current roster in join order, with `in_call` derived from membership.
    pub fn roster(&self) -> Vec<UserInfo> {
        let mut users: Vec<(&ConnectionId, &User)> = self.users.iter().collect();
        users.sort_by_key(|(_, user)| user.joined);
        users
            .into_iter()
            .map(|(&id, user)| UserInfo {
                connection_id: id,
                display_name: user.display_name.clone(),
                in_call: self.call_of(id).is_some(),
            })
            .collect()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn call_count(&self) -> usize {
        self.calls.len()
    }

    pub fn has_offer(&self, caller: ConnectionId, callee: ConnectionId) -> bool {
        self.offers.contains(&CallOffer { caller, callee })
    }

    pub fn offer_count(&self) -> usize {
        self.offers.len()
    }

    /// Everyone `id` currently shares a call with.
    pub fn partners_of(&self, id: ConnectionId) -> Vec<ConnectionId> {
        self.call_of(id)
            .and_then(|call_id| self.calls.get(&call_id))
            .map(|call| call.members.iter().copied().filter(|&m| m != id).collect())
            .unwrap_or_default()
    }

    fn broadcast_roster(&self, out: &mut impl Transport) {
        out.broadcast(&ServerMessage::UpdateUserList {
            users: self.roster(),
        });
    }

    fn user_info(&self, id: ConnectionId) -> Option<UserInfo> {
        self.users.get(&id).map(|user| UserInfo {
            connection_id: id,
            display_name: user.display_name.clone(),
            in_call: self.call_of(id).is_some(),
        })
    }

    fn call_of(&self, id: ConnectionId) -> Option<CallId> {
        self.memberships.get(&id).copied()
    }

    fn in_same_call(&self, a: ConnectionId, b: ConnectionId) -> bool {
        matches!((self.call_of(a), self.call_of(b)), (Some(x), Some(y)) if x == y)
    }
}
