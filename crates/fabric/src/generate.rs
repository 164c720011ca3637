//! Desired-state generation
//!
//! Pure expansion of a validated spec plus its topology plan into the
//! concrete object graph: one device per leaf/spine/server index, one
//! interface per physical port or breakout lane, one cable per
//! connectivity rule. Identical inputs produce byte-identical graphs.
//!
//! Identity and naming are deliberately decoupled: `stable_id` comes
//! from the logical position, names come from the spec's template (for
//! devices) or a fixed positional scheme (for interfaces and cables).
//! Changing the template renames devices in place without touching
//! identity or relations.

use crate::graph::{DesiredObject, DesiredStateGraph, ObjectKind, StableId, fields};
use crate::plan::TopologyPlan;
use crate::spec::ValidatedSpec;
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerateError {
    /// The naming template produced a collision the validator did not
    /// catch. The graph is discarded; nothing partial escapes.
    #[error("generated name '{name}' is not unique (positions '{first}' and '{second}')")]
    DuplicateName { name: String, first: String, second: String },
}

struct Builder<'a> {
    spec: &'a ValidatedSpec,
    graph: DesiredStateGraph,
}

impl<'a> Builder<'a> {
    fn new(spec: &'a ValidatedSpec) -> Self {
        Self { spec, graph: DesiredStateGraph::new(spec.id.clone()) }
    }

    fn id(&self, kind: ObjectKind, position: &str) -> StableId {
        StableId::derive(&self.spec.id, kind, position)
    }

    fn push(&mut self, kind: ObjectKind, position: String, attributes: BTreeMap<String, Value>) {
        let managed_fields: BTreeSet<String> = attributes.keys().cloned().collect();
        let object = DesiredObject {
            stable_id: self.id(kind, &position),
            kind,
            position,
            attributes,
            managed_fields,
        };
        self.graph.objects_of_mut(kind).push(object);
    }

    fn device(&mut self, position: String, name: String, role: &str, model: Option<&str>) {
        let mut attributes = BTreeMap::new();
        attributes.insert(fields::NAME.to_string(), json!(name));
        attributes.insert(fields::ROLE.to_string(), json!(role));
        if let Some(model) = model {
            attributes.insert(fields::MODEL.to_string(), json!(model));
        }
        self.push(ObjectKind::Device, position, attributes);
    }

    fn interface(
        &mut self,
        position: String,
        name: String,
        device_position: &str,
        speed_gbps: u32,
        breakout: Option<String>,
    ) {
        let device_id = self.id(ObjectKind::Device, device_position);
        let mut attributes = BTreeMap::new();
        attributes.insert(fields::NAME.to_string(), json!(name));
        attributes.insert(fields::DEVICE.to_string(), json!(device_id.as_str()));
        attributes.insert(fields::SPEED_GBPS.to_string(), json!(speed_gbps));
        if let Some(breakout) = breakout {
            attributes.insert(fields::BREAKOUT.to_string(), json!(breakout));
        }
        self.push(ObjectKind::Interface, position, attributes);
    }

    fn cable(&mut self, position_a: &str, name_a: &str, position_b: &str, name_b: &str) {
        let endpoint_a = self.id(ObjectKind::Interface, position_a);
        let endpoint_b = self.id(ObjectKind::Interface, position_b);
        let mut attributes = BTreeMap::new();
        attributes.insert(fields::NAME.to_string(), json!(format!("{}--{}", name_a, name_b)));
        attributes.insert(fields::ENDPOINT_A.to_string(), json!(endpoint_a.as_str()));
        attributes.insert(fields::ENDPOINT_B.to_string(), json!(endpoint_b.as_str()));
        self.push(ObjectKind::Cable, format!("cable/{}--{}", position_a, position_b), attributes);
    }
}

/// Positional short name for interfaces and cables, independent of the
/// device naming template.
fn slot_name(role: &str, index: u32, width: usize, slot: &str) -> String {
    format!("{}{:0width$}:{}", role, index, slot, width = width)
}

/// Expand the spec and topology plan into the desired-state graph.
///
/// Pure function - no I/O, no clock, no map-iteration order. Expansion
/// order is fixed: spines, leaves, servers by class declaration order;
/// indexes are 1-based and only ever appended to, so scaling a count up
/// never disturbs previously generated positions.
pub fn generate(
    spec: &ValidatedSpec,
    topo: &TopologyPlan,
) -> Result<DesiredStateGraph, GenerateError> {
    let mut b = Builder::new(spec);
    let width = spec.index_width;

    // Devices: spines, leaves, servers.
    for s in 1..=topo.spine_count {
        b.device(
            format!("spine/{}", s),
            spec.render_name("spine", s),
            "spine",
            Some(&spec.spine.model),
        );
    }
    for l in 1..=topo.leaf_count {
        b.device(
            format!("leaf/{}", l),
            spec.render_name("leaf", l),
            "leaf",
            Some(&spec.leaf.model),
        );
    }
    for class in &spec.server_classes {
        for i in 1..=class.count {
            b.device(
                format!("server/{}/{}", class.name, i),
                spec.render_name(&class.name, i),
                "server",
                None,
            );
        }
    }

    // Interfaces: every spine port, every leaf uplink and downlink
    // lane, every server NIC.
    for s in 1..=topo.spine_count {
        for p in 1..=spec.spine.port_count {
            b.interface(
                format!("spine/{}/down/{}", s, p),
                slot_name("spine", s, width, &format!("d{}", p)),
                &format!("spine/{}", s),
                spec.spine.port_speed_gbps,
                None,
            );
        }
    }
    let breakout = topo.downlink_breakout.to_string();
    for l in 1..=topo.leaf_count {
        for u in 1..=topo.uplinks_per_leaf {
            b.interface(
                format!("leaf/{}/uplink/{}", l, u),
                slot_name("leaf", l, width, &format!("u{}", u)),
                &format!("leaf/{}", l),
                spec.leaf.port_speed_gbps,
                None,
            );
        }
        for lane in 1..=topo.downlink_lanes_per_leaf {
            b.interface(
                format!("leaf/{}/down/{}", l, lane),
                slot_name("leaf", l, width, &format!("d{}", lane)),
                &format!("leaf/{}", l),
                topo.downlink_breakout.lane_gbps,
                Some(breakout.clone()),
            );
        }
    }
    for class in &spec.server_classes {
        for i in 1..=class.count {
            for n in 1..=topo.nics_per_server {
                b.interface(
                    format!("server/{}/{}/nic/{}", class.name, i, n),
                    slot_name(&class.name, i, width, &format!("nic{}", n)),
                    &format!("server/{}/{}", class.name, i),
                    spec.leaf.downlink_speed_gbps,
                    None,
                );
            }
        }
    }

    // Cables, rule 1: leaf-to-spine mesh. Each uplink lands on the
    // least-loaded spine (lowest index on ties), which keeps port
    // assignment balanced, deterministic, and append-only as leaves are
    // added.
    let mut spine_next_port = vec![0u32; topo.spine_count as usize];
    for l in 1..=topo.leaf_count {
        for u in 1..=topo.uplinks_per_leaf {
            let s = spine_next_port
                .iter()
                .enumerate()
                .min_by_key(|&(i, &used)| (used, i))
                .map(|(i, _)| i)
                .unwrap_or(0);
            spine_next_port[s] += 1;
            let port = spine_next_port[s];
            b.cable(
                &format!("leaf/{}/uplink/{}", l, u),
                &slot_name("leaf", l, width, &format!("u{}", u)),
                &format!("spine/{}/down/{}", s as u32 + 1, port),
                &slot_name("spine", s as u32 + 1, width, &format!("d{}", port)),
            );
        }
    }

    // Cables, rule 2: server homing. Global server order is class
    // declaration order; primary leaf is the rack the unit fills,
    // further NICs walk to the following leaves. Lanes are handed out
    // per leaf in that same fixed order.
    let mut leaf_next_lane = vec![0u32; topo.leaf_count as usize];
    let mut global = 0u32;
    for class in &spec.server_classes {
        for i in 1..=class.count {
            let primary = global / spec.leaf.units_per_leaf;
            for n in 0..topo.nics_per_server {
                let leaf = (primary + n) % topo.leaf_count;
                leaf_next_lane[leaf as usize] += 1;
                let lane = leaf_next_lane[leaf as usize];
                b.cable(
                    &format!("server/{}/{}/nic/{}", class.name, i, n + 1),
                    &slot_name(&class.name, i, width, &format!("nic{}", n + 1)),
                    &format!("leaf/{}/down/{}", leaf + 1, lane),
                    &slot_name("leaf", leaf + 1, width, &format!("d{}", lane)),
                );
            }
            global += 1;
        }
    }

    check_name_uniqueness(&b.graph)?;
    Ok(b.graph)
}

fn check_name_uniqueness(graph: &DesiredStateGraph) -> Result<(), GenerateError> {
    let mut seen: BTreeMap<&str, &str> = BTreeMap::new();
    for object in graph.iter() {
        let name = object.name();
        if let Some(first) = seen.insert(name, &object.position) {
            return Err(GenerateError::DuplicateName {
                name: name.to_string(),
                first: first.to_string(),
                second: object.position.clone(),
            });
        }
    }
    Ok(())
}
