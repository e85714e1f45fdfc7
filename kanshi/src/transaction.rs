//! Transaction engine (C5): builds an atomic output configuration from a
//! matched profile and drives it through the compositor's three-way outcome.
//! Spec.md §4.4.

use std::collections::HashMap;

use thiserror::Error;
use tracing::{info, warn};
use wayland_client::{Connection, Dispatch, QueueHandle};
use wayland_protocols_wlr::output_management::v1::client::{
    zwlr_output_configuration_head_v1, zwlr_output_configuration_v1,
};

use crate::config::{Profile, ProfileOutput};
use crate::daemon::Daemon;
use crate::head::{transform_to_wire, HeadId, HeadRegistry, ModeId};

/// Refresh-rate tolerance used when matching a requested mode, per spec.md
/// §4.4/Testable Property 10.
const REFRESH_TOLERANCE_MHZ: i32 = 50;

#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("no mode matching {width}x{height}@{refresh}mHz on head {head}")]
    UnsupportedMode {
        head: String,
        width: i32,
        height: i32,
        refresh: i32,
    },
}

/// Holds the fields of spec.md §3's "Engine state" that aren't already owned
/// by [`Daemon`] (config, heads). An explicit enum would also work, but
/// `current`/`pending`/`forced_profile` are independently nullable per the
/// data model, so a flat struct mirrors it more directly than nesting them
/// in a sum type.
#[derive(Debug, Default)]
pub struct Engine {
    pub current: Option<String>,
    pub pending: Option<Pending>,
    pub forced_profile: Option<String>,
    pub one_shot: bool,
}

#[derive(Debug)]
pub struct Pending {
    pub profile: Profile,
}

impl Engine {
    pub fn new() -> Self {
        Engine::default()
    }

    /// Spec.md §4.4's create path is "P ≠ current and P ≠ pending"; Testable
    /// Property 7 additionally requires that reapplying the *same* current
    /// profile is a no-op when nothing would actually change. Folding both
    /// into one predicate: always apply when the profile differs from
    /// current, and apply when it doesn't only if some head's attributes
    /// would actually change.
    pub fn should_apply(
        &self,
        profile_name: &str,
        assignment: &HashMap<HeadId, &ProfileOutput>,
        heads: &HeadRegistry,
    ) -> bool {
        if self.pending.is_some() {
            return false;
        }
        if self.current.as_deref() != Some(profile_name) {
            return true;
        }
        assignment.iter().any(|(&id, output)| head_would_change(heads, id, output))
    }
}

fn head_would_change(heads: &HeadRegistry, id: HeadId, output: &ProfileOutput) -> bool {
    let head = heads.head(id);
    let effective_enabled = output.enabled.unwrap_or(head.enabled);
    if effective_enabled != head.enabled {
        return true;
    }
    if !effective_enabled {
        return false;
    }
    if let Some(mode) = output.mode {
        match find_mode(heads, id, mode) {
            Some(mode_id) => {
                if head.current_mode != Some(mode_id) {
                    return true;
                }
            }
            None => return true,
        }
    }
    if let Some(position) = output.position {
        if position != head.position {
            return true;
        }
    }
    if let Some(scale) = output.scale {
        if (scale - head.scale).abs() > f64::EPSILON {
            return true;
        }
    }
    if let Some(transform) = output.transform {
        if transform != head.transform {
            return true;
        }
    }
    false
}

/// Finds the mode on `head` matching `spec`: same width/height, and either
/// the highest refresh at that size (spec refresh 0) or any mode within
/// ±50 mHz of the requested refresh (Testable Property 10).
fn find_mode(heads: &HeadRegistry, id: HeadId, spec: crate::config::ModeSpec) -> Option<ModeId> {
    let head = heads.head(id);
    let mut candidates = head
        .modes
        .iter()
        .copied()
        .filter(|&m| {
            let mode = heads.mode(m);
            mode.width == spec.width && mode.height == spec.height
        });

    if spec.refresh == 0 {
        candidates.max_by_key(|&m| heads.mode(m).refresh)
    } else {
        candidates.find(|&m| (heads.mode(m).refresh - spec.refresh).abs() <= REFRESH_TOLERANCE_MHZ)
    }
}

/// Builds a configuration object from `assignment` and submits it. The
/// caller sets `daemon.engine.pending` on success — it already holds the
/// matched profile, so there's no reason for this function to take one too.
pub fn submit(
    daemon: &mut Daemon,
    assignment: &HashMap<HeadId, &ProfileOutput>,
    serial: u32,
) -> Result<(), TransactionError> {
    let qh = daemon.qh.clone();
    let configuration = daemon.heads.manager().create_configuration(serial, &qh, ());

    let head_ids: Vec<HeadId> = daemon.heads.heads().map(|(id, _)| id).collect();
    for id in head_ids {
        let output = assignment[&id];
        let head = daemon.heads.head(id);
        let effective_enabled = output.enabled.unwrap_or(head.enabled);

        if !effective_enabled {
            configuration.disable_head(&head.wl);
            continue;
        }

        let cfg_head = configuration.enable_head(&head.wl, &qh, ());

        if let Some(mode) = output.mode {
            match find_mode(&daemon.heads, id, mode) {
                Some(mode_id) => cfg_head.set_mode(&daemon.heads.mode(mode_id).wl),
                None => {
                    configuration.destroy();
                    return Err(TransactionError::UnsupportedMode {
                        head: head.name.clone(),
                        width: mode.width,
                        height: mode.height,
                        refresh: mode.refresh,
                    });
                }
            }
        }
        if let Some(position) = output.position {
            cfg_head.set_position(position.x, position.y);
        }
        if let Some(scale) = output.scale {
            cfg_head.set_scale(scale);
        }
        if let Some(transform) = output.transform {
            cfg_head.set_transform(transform_to_wire(transform));
        }
    }

    configuration.apply();
    Ok(())
}

impl Dispatch<zwlr_output_configuration_v1::ZwlrOutputConfigurationV1, ()> for Daemon {
    fn event(
        state: &mut Self,
        proxy: &zwlr_output_configuration_v1::ZwlrOutputConfigurationV1,
        event: zwlr_output_configuration_v1::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        use zwlr_output_configuration_v1::Event;
        let Some(pending) = state.engine.pending.take() else {
            return;
        };

        match event {
            Event::Succeeded => {
                info!(profile = %pending.profile.name, "transaction succeeded");
                state.engine.current = Some(pending.profile.name.clone());
                crate::hook::run_all(&pending.profile.exec);
                if state.engine.one_shot {
                    state.exit_code = Some(0);
                }
            }
            Event::Failed => {
                warn!(profile = %pending.profile.name, "transaction failed");
                if state.engine.one_shot {
                    state.exit_code = Some(1);
                }
            }
            Event::Cancelled => {
                info!(profile = %pending.profile.name, "transaction cancelled, will retry on next snapshot");
                // Per spec.md §4.4: wait for the next `done(serial)`, don't
                // re-match against the now possibly-stale serial.
            }
            _ => {}
        }
        proxy.destroy();
    }
}

impl Dispatch<zwlr_output_configuration_head_v1::ZwlrOutputConfigurationHeadV1, ()> for Daemon {
    fn event(
        _state: &mut Self,
        _proxy: &zwlr_output_configuration_head_v1::ZwlrOutputConfigurationHeadV1,
        _event: zwlr_output_configuration_head_v1::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        // This interface has no events.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProfileOutput;

    #[test]
    fn should_apply_when_profile_differs_from_current() {
        let engine = Engine {
            current: Some("old".into()),
            ..Engine::default()
        };
        let heads = HeadRegistry::new();
        let assignment = HashMap::new();
        assert!(engine.should_apply("new", &assignment, &heads));
    }

    #[test]
    fn should_not_apply_when_pending() {
        let engine = Engine {
            pending: Some(Pending {
                profile: Profile::new("p"),
            }),
            ..Engine::default()
        };
        let heads = HeadRegistry::new();
        assert!(!engine.should_apply("p", &HashMap::new(), &heads));
    }

    #[test]
    fn no_op_when_current_matches_and_nothing_changes() {
        // Property 7: current==profile, no heads in the assignment (the
        // empty case trivially has no attribute changes) -> no apply.
        let engine = Engine {
            current: Some("same".into()),
            ..Engine::default()
        };
        let heads = HeadRegistry::new();
        assert!(!engine.should_apply("same", &HashMap::new(), &heads));
    }

    #[test]
    fn output_without_explicit_fields_keeps_head_enabled_state() {
        let output = ProfileOutput::new("DP-1");
        assert_eq!(output.enabled, None);
    }
}
