//! Head registry (C3): mirrors the compositor's `wlr-output-management-unstable-v1`
//! state. Spec.md §4.2.

use std::collections::HashMap;

use slotmap::SlotMap;
use tracing::{debug, info};
use wayland_client::backend::ObjectId;
use wayland_client::protocol::wl_output;
use wayland_client::{Connection, Dispatch, Proxy, QueueHandle, WEnum};
use wayland_protocols_wlr::output_management::v1::client::{
    zwlr_output_head_v1, zwlr_output_manager_v1, zwlr_output_mode_v1,
};

use crate::config::{Position, Transform};
use crate::daemon::Daemon;

slotmap::new_key_type! {
    pub struct HeadId;
    pub struct ModeId;
}

#[derive(Debug)]
pub struct Mode {
    pub width: i32,
    pub height: i32,
    /// Millihertz.
    pub refresh: i32,
    pub preferred: bool,
    pub(crate) wl: zwlr_output_mode_v1::ZwlrOutputModeV1,
}

#[derive(Debug)]
pub struct Head {
    pub name: String,
    pub description: String,
    pub physical_size: (i32, i32),
    /// Advertised modes, in announce order.
    pub modes: Vec<ModeId>,
    pub enabled: bool,
    pub current_mode: Option<ModeId>,
    pub position: Position,
    pub transform: Transform,
    pub scale: f64,
    pub(crate) wl: zwlr_output_head_v1::ZwlrOutputHeadV1,
}

fn transform_from_wire(value: WEnum<wl_output::Transform>) -> Transform {
    match value.into_result().unwrap_or(wl_output::Transform::Normal) {
        wl_output::Transform::Normal => Transform::Normal,
        wl_output::Transform::_90 => Transform::Rotate90,
        wl_output::Transform::_180 => Transform::Rotate180,
        wl_output::Transform::_270 => Transform::Rotate270,
        wl_output::Transform::Flipped => Transform::Flipped,
        wl_output::Transform::Flipped90 => Transform::Flipped90,
        wl_output::Transform::Flipped180 => Transform::Flipped180,
        wl_output::Transform::Flipped270 => Transform::Flipped270,
        _ => Transform::Normal,
    }
}

pub fn transform_to_wire(transform: Transform) -> wl_output::Transform {
    match transform {
        Transform::Normal => wl_output::Transform::Normal,
        Transform::Rotate90 => wl_output::Transform::_90,
        Transform::Rotate180 => wl_output::Transform::_180,
        Transform::Rotate270 => wl_output::Transform::_270,
        Transform::Flipped => wl_output::Transform::Flipped,
        Transform::Flipped90 => wl_output::Transform::Flipped90,
        Transform::Flipped180 => wl_output::Transform::Flipped180,
        Transform::Flipped270 => wl_output::Transform::Flipped270,
    }
}

/// The live mirror of the compositor's output topology.
///
/// Between two `done` events the head list and its attributes may be
/// partially updated; callers must not read it until [`HeadRegistry::serial`]
/// reflects a fresh snapshot (spec.md §4.2's consistency invariant).
#[derive(Debug, Default)]
pub struct HeadRegistry {
    manager: Option<zwlr_output_manager_v1::ZwlrOutputManagerV1>,
    heads: SlotMap<HeadId, Head>,
    modes: SlotMap<ModeId, Mode>,
    /// Announce order; the matcher iterates heads in this order (spec.md §4.3).
    order: Vec<HeadId>,
    head_by_object: HashMap<ObjectId, HeadId>,
    mode_by_object: HashMap<ObjectId, ModeId>,
    serial: Option<u32>,
}

impl HeadRegistry {
    pub fn new() -> Self {
        HeadRegistry::default()
    }

    pub fn set_manager(&mut self, manager: zwlr_output_manager_v1::ZwlrOutputManagerV1) {
        self.manager = Some(manager);
    }

    pub fn manager(&self) -> &zwlr_output_manager_v1::ZwlrOutputManagerV1 {
        self.manager.as_ref().expect("output manager not bound yet")
    }

    pub fn serial(&self) -> Option<u32> {
        self.serial
    }

    pub fn heads(&self) -> impl Iterator<Item = (HeadId, &Head)> {
        self.order.iter().copied().map(move |id| (id, &self.heads[id]))
    }

    pub fn head(&self, id: HeadId) -> &Head {
        &self.heads[id]
    }

    pub fn mode(&self, id: ModeId) -> &Mode {
        &self.modes[id]
    }

    pub fn head_count(&self) -> usize {
        self.order.len()
    }

    fn head_id_for(&self, proxy: &zwlr_output_head_v1::ZwlrOutputHeadV1) -> Option<HeadId> {
        self.head_by_object.get(&proxy.id()).copied()
    }

    fn mode_id_for(&self, proxy: &zwlr_output_mode_v1::ZwlrOutputModeV1) -> Option<ModeId> {
        self.mode_by_object.get(&proxy.id()).copied()
    }
}

impl Dispatch<zwlr_output_manager_v1::ZwlrOutputManagerV1, ()> for Daemon {
    fn event(
        state: &mut Self,
        _proxy: &zwlr_output_manager_v1::ZwlrOutputManagerV1,
        event: zwlr_output_manager_v1::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        use zwlr_output_manager_v1::Event;
        let registry = &mut state.heads;
        match event {
            Event::Head { head } => {
                let id = registry.heads.insert(Head {
                    name: String::new(),
                    description: String::new(),
                    physical_size: (0, 0),
                    modes: Vec::new(),
                    enabled: false,
                    current_mode: None,
                    position: Position { x: 0, y: 0 },
                    transform: Transform::Normal,
                    scale: 1.0,
                    wl: head.clone(),
                });
                registry.head_by_object.insert(head.id(), id);
                registry.order.push(id);
            }
            Event::Done { serial } => {
                registry.serial = Some(serial);
                debug!(serial, heads = registry.order.len(), "topology settled");
                state.on_topology_settled(serial);
            }
            Event::Finished => {
                info!("compositor output manager finished");
            }
            _ => {}
        }
    }

    wayland_client::event_created_child!(Daemon, zwlr_output_manager_v1::ZwlrOutputManagerV1, [
        zwlr_output_manager_v1::EVT_HEAD_OPCODE => (zwlr_output_head_v1::ZwlrOutputHeadV1, ()),
    ]);
}

impl Dispatch<zwlr_output_head_v1::ZwlrOutputHeadV1, ()> for Daemon {
    fn event(
        state: &mut Self,
        proxy: &zwlr_output_head_v1::ZwlrOutputHeadV1,
        event: zwlr_output_head_v1::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        use zwlr_output_head_v1::Event;
        let registry = &mut state.heads;
        let Some(id) = registry.head_id_for(proxy) else {
            return;
        };

        match event {
            Event::Name { name } => registry.heads[id].name = name,
            Event::Description { description } => registry.heads[id].description = description,
            Event::PhysicalSize { width, height } => {
                registry.heads[id].physical_size = (width, height)
            }
            Event::Mode { mode } => {
                if let Some(mode_id) = registry.mode_id_for(&mode) {
                    registry.heads[id].modes.push(mode_id);
                }
            }
            Event::Enabled { enabled } => registry.heads[id].enabled = enabled != 0,
            Event::CurrentMode { mode } => {
                registry.heads[id].current_mode = registry.mode_id_for(&mode);
            }
            Event::Position { x, y } => registry.heads[id].position = Position { x, y },
            Event::Transform { transform } => {
                registry.heads[id].transform = transform_from_wire(transform)
            }
            Event::Scale { scale } => registry.heads[id].scale = scale,
            Event::Finished => {
                if let Some(head) = registry.heads.remove(id) {
                    registry.head_by_object.remove(&head.wl.id());
                    registry.order.retain(|&h| h != id);
                    for mode_id in head.modes {
                        if let Some(mode) = registry.modes.remove(mode_id) {
                            registry.mode_by_object.remove(&mode.wl.id());
                        }
                    }
                }
            }
            _ => {}
        }
    }

    wayland_client::event_created_child!(Daemon, zwlr_output_head_v1::ZwlrOutputHeadV1, [
        zwlr_output_head_v1::EVT_MODE_OPCODE => (zwlr_output_mode_v1::ZwlrOutputModeV1, ()),
    ]);
}

impl Dispatch<zwlr_output_mode_v1::ZwlrOutputModeV1, ()> for Daemon {
    fn event(
        state: &mut Self,
        proxy: &zwlr_output_mode_v1::ZwlrOutputModeV1,
        event: zwlr_output_mode_v1::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        use zwlr_output_mode_v1::Event;
        let registry = &mut state.heads;

        // The mode object is created via event_created_child when the owning
        // head's `mode` event fires, but this is the first event routed to it.
        let id = registry.mode_id_for(proxy).unwrap_or_else(|| {
            let id = registry.modes.insert(Mode {
                width: 0,
                height: 0,
                refresh: 0,
                preferred: false,
                wl: proxy.clone(),
            });
            registry.mode_by_object.insert(proxy.id(), id);
            id
        });

        match event {
            Event::Size { width, height } => {
                registry.modes[id].width = width;
                registry.modes[id].height = height;
            }
            Event::Refresh { refresh } => registry.modes[id].refresh = refresh,
            Event::Preferred => registry.modes[id].preferred = true,
            Event::Finished => {
                if let Some(mode) = registry.modes.remove(id) {
                    registry.mode_by_object.remove(&mode.wl.id());
                }
                for head in registry.heads.values_mut() {
                    head.modes.retain(|&m| m != id);
                    if head.current_mode == Some(id) {
                        head.current_mode = None;
                    }
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_round_trips_through_wire_encoding() {
        for transform in [
            Transform::Normal,
            Transform::Rotate90,
            Transform::Rotate180,
            Transform::Rotate270,
            Transform::Flipped,
            Transform::Flipped90,
            Transform::Flipped180,
            Transform::Flipped270,
        ] {
            let wire = transform_to_wire(transform);
            assert_eq!(transform_from_wire(WEnum::Value(wire)), transform);
        }
    }
}
