// Compiled binding graph
//
// One node per (map, action). Each node owns the merged device paths, the
// typed streams for its value kind and an optional long-press detector. The
// graph is the event multiplexer: streams are looked up by key, or by action
// name alone in compile order.

use super::action::{ActionKey, ValueKind};
use super::config::{ActionBinding, PlayerSlotConfig};
use super::device::{ControlValue, DeviceHandle, DeviceLayer};
use super::long_press::LongPressDetector;
use super::path::{Composite2D, CompositeMode, ControlPath, DevicePath};
use super::stream::Stream;
use super::task::CancellationToken;
use crate::core::math::{clamp01, clamp_unit};
use glam::Vec2;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Magnitude at which a control counts as pressed
pub const PRESS_POINT: f32 = 0.5;

/// Typed output channels of a node
#[derive(Debug, Clone)]
pub enum Emitter {
    Button {
        /// Fires once on each activation edge
        pulse: Stream<()>,
        /// `true` on press start, `false` on release or cancel
        press: Stream<bool>,
    },
    Vector2(Stream<Vec2>),
    Scalar(Stream<f32>),
}

impl Emitter {
    fn for_kind(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Button => Emitter::Button {
                pulse: Stream::new(),
                press: Stream::new(),
            },
            ValueKind::Vector2 => Emitter::Vector2(Stream::new()),
            ValueKind::Scalar => Emitter::Scalar(Stream::new()),
        }
    }

    fn close(&self) {
        match self {
            Emitter::Button { pulse, press } => {
                pulse.close();
                press.close();
            }
            Emitter::Vector2(stream) => stream.close(),
            Emitter::Scalar(stream) => stream.close(),
        }
    }
}

#[derive(Debug)]
struct LongPress {
    detector: LongPressDetector,
    threshold: f32,
    fired: Stream<()>,
}

/// The strongest reading of a node this tick and the device it came from
#[derive(Debug, Clone, Copy, Default)]
struct Sample<'a> {
    vector: Vec2,
    scalar: f32,
    magnitude: f32,
    source: Option<&'a DeviceHandle>,
}

impl<'a> Sample<'a> {
    fn offer(&mut self, vector: Vec2, scalar: f32, magnitude: f32, source: &'a DeviceHandle) {
        if magnitude > self.magnitude {
            *self = Sample {
                vector,
                scalar,
                magnitude,
                source: Some(source),
            };
        }
    }
}

/// One compiled action
#[derive(Debug)]
pub struct BindingNode {
    key: ActionKey,
    kind: ValueKind,
    raw_paths: Vec<String>,
    paths: Vec<DevicePath>,
    emitter: Emitter,
    long_press: Option<LongPress>,
    pressed: bool,
    last_vector: Vec2,
    last_scalar: f32,
}

impl BindingNode {
    fn new(key: ActionKey, kind: ValueKind) -> Self {
        Self {
            key,
            kind,
            raw_paths: Vec::new(),
            paths: Vec::new(),
            emitter: Emitter::for_kind(kind),
            long_press: None,
            pressed: false,
            last_vector: Vec2::ZERO,
            last_scalar: 0.0,
        }
    }

    pub fn key(&self) -> &ActionKey {
        &self.key
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// Raw device paths after merging, in first-seen order
    pub fn raw_paths(&self) -> &[String] {
        &self.raw_paths
    }

    /// Paths that parsed successfully
    pub fn parsed_paths(&self) -> &[DevicePath] {
        &self.paths
    }

    pub fn emitter(&self) -> &Emitter {
        &self.emitter
    }

    pub fn has_long_press(&self) -> bool {
        self.long_press.is_some()
    }

    pub fn long_press_duration(&self) -> Option<Duration> {
        self.long_press.as_ref().map(|lp| lp.detector.duration())
    }

    /// Whether the node is currently actuated (pressed, or non-zero)
    pub fn is_active(&self) -> bool {
        match self.kind {
            ValueKind::Button => self.pressed,
            ValueKind::Vector2 => self.last_vector != Vec2::ZERO,
            ValueKind::Scalar => self.last_scalar != 0.0,
        }
    }

    pub fn button_stream(&self) -> Option<Stream<()>> {
        match &self.emitter {
            Emitter::Button { pulse, .. } => Some(pulse.clone()),
            _ => None,
        }
    }

    pub fn press_state_stream(&self) -> Option<Stream<bool>> {
        match &self.emitter {
            Emitter::Button { press, .. } => Some(press.clone()),
            _ => None,
        }
    }

    pub fn vector2_stream(&self) -> Option<Stream<Vec2>> {
        match &self.emitter {
            Emitter::Vector2(stream) => Some(stream.clone()),
            _ => None,
        }
    }

    pub fn scalar_stream(&self) -> Option<Stream<f32>> {
        match &self.emitter {
            Emitter::Scalar(stream) => Some(stream.clone()),
            _ => None,
        }
    }

    pub fn long_press_stream(&self) -> Option<Stream<()>> {
        self.long_press.as_ref().map(|lp| lp.fired.clone())
    }

    fn merge(&mut self, binding: &ActionBinding, token: &CancellationToken) {
        for raw in &binding.device_paths {
            if self.raw_paths.contains(raw) {
                continue;
            }
            self.raw_paths.push(raw.clone());
            match DevicePath::parse(raw) {
                Ok(path) => self.paths.push(path),
                Err(err) => log::error!("Action '{}': {}", self.key, err),
            }
        }

        let Some(duration) = binding.long_press() else {
            return;
        };
        if self.long_press.is_some() {
            return;
        }
        if self.kind == ValueKind::Vector2 {
            log::warn!(
                "Action '{}': long-press is only supported on button and scalar actions",
                self.key
            );
            return;
        }
        self.long_press = Some(LongPress {
            detector: LongPressDetector::new(duration, token.clone()),
            threshold: binding.effective_threshold(),
            fired: Stream::new(),
        });
    }

    fn sample<'a>(&self, layer: &dyn DeviceLayer, paired: &'a [DeviceHandle]) -> Sample<'a> {
        let mut sample = Sample::default();
        for path in &self.paths {
            match path {
                DevicePath::Control(control) => {
                    for device in paired {
                        if let Some(value) = read(layer, device, control) {
                            let (vector, scalar) = split(value);
                            sample.offer(vector, scalar, value.magnitude(), device);
                        }
                    }
                }
                DevicePath::Composite(composite) => {
                    if let Some((vector, source)) = read_composite(layer, paired, composite) {
                        sample.offer(vector, vector.length(), vector.length(), source);
                    }
                }
            }
        }
        sample
    }

    /// Sample the paired devices and emit; returns the performing device
    fn update<'a>(
        &mut self,
        now: Duration,
        layer: &dyn DeviceLayer,
        paired: &'a [DeviceHandle],
    ) -> Option<&'a DeviceHandle> {
        let sample = self.sample(layer, paired);
        let mut performed = false;

        match &self.emitter {
            Emitter::Button { pulse, press } => {
                let pressed = sample.magnitude >= PRESS_POINT;
                if pressed && !self.pressed {
                    self.pressed = true;
                    press.emit(&true);
                    pulse.emit(&());
                    performed = true;
                } else if !pressed && self.pressed {
                    self.pressed = false;
                    press.emit(&false);
                }
                if let Some(lp) = self.long_press.as_mut() {
                    if lp.detector.update(pressed, now) {
                        lp.fired.emit(&());
                    }
                }
            }
            Emitter::Vector2(stream) => {
                let value = clamp_unit(sample.vector);
                if value != self.last_vector {
                    self.last_vector = value;
                    stream.emit(&value);
                    performed = value != Vec2::ZERO;
                }
            }
            Emitter::Scalar(stream) => {
                let value = sample.scalar;
                if value != self.last_scalar {
                    self.last_scalar = value;
                    stream.emit(&value);
                    performed = value != 0.0;
                }
                if let Some(lp) = self.long_press.as_mut() {
                    if lp.detector.update(value >= lp.threshold, now) {
                        lp.fired.emit(&());
                    }
                }
            }
        }

        if performed {
            sample.source
        } else {
            None
        }
    }

    /// Cancel an in-flight press: release values are emitted, long-press is reset
    fn reset(&mut self) {
        match &self.emitter {
            Emitter::Button { press, .. } => {
                if self.pressed {
                    self.pressed = false;
                    press.emit(&false);
                }
            }
            Emitter::Vector2(stream) => {
                if self.last_vector != Vec2::ZERO {
                    self.last_vector = Vec2::ZERO;
                    stream.emit(&Vec2::ZERO);
                }
            }
            Emitter::Scalar(stream) => {
                if self.last_scalar != 0.0 {
                    self.last_scalar = 0.0;
                    stream.emit(&0.0);
                }
            }
        }
        if let Some(lp) = self.long_press.as_mut() {
            lp.detector.cancel();
        }
    }

    fn close(&self) {
        self.emitter.close();
        if let Some(lp) = &self.long_press {
            lp.fired.close();
        }
    }
}

fn read(layer: &dyn DeviceLayer, device: &DeviceHandle, path: &ControlPath) -> Option<ControlValue> {
    if !layer.is_layout_descendant_of(&device.layout, &path.layout) {
        return None;
    }
    layer.read_control(device.id, &path.control)
}

/// Two-axis and scalar views of a raw value
fn split(value: ControlValue) -> (Vec2, f32) {
    match value {
        ControlValue::Button(pressed) => {
            let v = if pressed { 1.0 } else { 0.0 };
            (Vec2::ZERO, v)
        }
        ControlValue::Vector2(v) => (v, v.length()),
        ControlValue::Scalar(v) => (Vec2::ZERO, v),
    }
}

fn read_composite<'a>(
    layer: &dyn DeviceLayer,
    paired: &'a [DeviceHandle],
    composite: &Composite2D,
) -> Option<(Vec2, &'a DeviceHandle)> {
    let mut source = None;
    let mut part = |path: &Option<ControlPath>| -> f32 {
        let Some(path) = path else {
            return 0.0;
        };
        let mut best = 0.0_f32;
        for device in paired {
            if let Some(value) = read(layer, device, path) {
                let magnitude = value.magnitude();
                if magnitude > best {
                    best = magnitude;
                    source = Some(device);
                }
            }
        }
        match composite.mode {
            CompositeMode::Analog => clamp01(best),
            CompositeMode::Digital | CompositeMode::DigitalNormalized => {
                if best >= PRESS_POINT {
                    1.0
                } else {
                    0.0
                }
            }
        }
    };

    let up = part(&composite.up);
    let down = part(&composite.down);
    let left = part(&composite.left);
    let right = part(&composite.right);

    let mut vector = Vec2::new(right - left, up - down);
    if composite.mode == CompositeMode::DigitalNormalized {
        vector = vector.normalize_or_zero();
    }
    if vector == Vec2::ZERO {
        return None;
    }
    source.map(|device| (vector, device))
}

/// Compiled (map, action) nodes for one player
#[derive(Debug, Default)]
pub struct BindingGraph {
    nodes: Vec<BindingNode>,
    index: HashMap<ActionKey, usize>,
}

impl BindingGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile every context of a slot
    pub fn build(slot: &PlayerSlotConfig, token: &CancellationToken) -> Self {
        let mut graph = Self::new();
        for context in &slot.contexts {
            for binding in &context.bindings {
                graph.add_binding(&context.map_id, binding, token);
            }
        }
        graph.warn_on_collisions();
        log::debug!(
            "Compiled {} actions for player {}",
            graph.nodes.len(),
            slot.player_id
        );
        graph
    }

    /// Add a binding, merging into an existing node with the same key
    pub fn add_binding(&mut self, map: &str, binding: &ActionBinding, token: &CancellationToken) {
        let key = ActionKey::new(map, binding.action_name.as_str());
        let kind = binding.resolved_kind();

        let index = match self.index.get(&key) {
            Some(&index) => {
                let existing = self.nodes[index].kind;
                if binding.value_kind.is_some() && existing != kind {
                    log::warn!(
                        "Action '{}' is bound as {} and {}; keeping {}",
                        key,
                        existing,
                        kind,
                        existing
                    );
                }
                index
            }
            None => {
                self.nodes.push(BindingNode::new(key.clone(), kind));
                self.index.insert(key, self.nodes.len() - 1);
                self.nodes.len() - 1
            }
        };
        self.nodes[index].merge(binding, token);
    }

    fn warn_on_collisions(&self) {
        let mut seen: HashMap<&str, &str> = HashMap::new();
        for node in &self.nodes {
            match seen.get(node.key.action.as_str()) {
                Some(first_map) if *first_map != node.key.map => log::warn!(
                    "Action '{}' exists in maps '{}' and '{}'; lookups without a map resolve to '{}'",
                    node.key.action,
                    first_map,
                    node.key.map,
                    first_map
                ),
                Some(_) => {}
                None => {
                    seen.insert(&node.key.action, &node.key.map);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in compile order
    pub fn nodes(&self) -> impl Iterator<Item = &BindingNode> {
        self.nodes.iter()
    }

    pub fn find(&self, map: &str, action: &str) -> Option<&BindingNode> {
        self.index
            .get(&ActionKey::new(map, action))
            .map(|&index| &self.nodes[index])
    }

    /// Find a node by action name only, first match in compile order
    pub fn find_any(&self, action: &str) -> Option<&BindingNode> {
        self.nodes.iter().find(|node| node.key.action == action)
    }

    /// Look in `preferred` first, then fall back to every node matching `accept`
    pub fn lookup<F>(&self, preferred: Option<&str>, action: &str, accept: F) -> Option<&BindingNode>
    where
        F: Fn(&BindingNode) -> bool,
    {
        preferred
            .and_then(|map| self.find(map, action))
            .filter(|node| accept(node))
            .or_else(|| {
                self.nodes
                    .iter()
                    .find(|node| node.key.action == action && accept(node))
            })
    }

    pub fn has_map(&self, map: &str) -> bool {
        self.nodes.iter().any(|node| node.key.map == map)
    }

    /// Advance every node of `map`; returns the last device that performed an action
    pub fn tick_map<'a>(
        &mut self,
        map: &str,
        now: Duration,
        layer: &dyn DeviceLayer,
        paired: &'a [DeviceHandle],
    ) -> Option<&'a DeviceHandle> {
        let mut source = None;
        for node in self.nodes.iter_mut().filter(|node| node.key.map == map) {
            if let Some(device) = node.update(now, layer, paired) {
                source = Some(device);
            }
        }
        source
    }

    /// Cancel in-flight presses of one map
    pub fn reset_map(&mut self, map: &str) {
        for node in self.nodes.iter_mut().filter(|node| node.key.map == map) {
            node.reset();
        }
    }

    pub fn reset_all(&mut self) {
        for node in &mut self.nodes {
            node.reset();
        }
    }

    /// Close every stream, dropping all subscribers
    pub fn close(&self) {
        for node in &self.nodes {
            node.close();
        }
    }

    /// Distinct map ids in compile order
    pub fn maps(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.nodes
            .iter()
            .map(|node| node.key.map.as_str())
            .filter(|map| seen.insert(*map))
            .collect()
    }
}
