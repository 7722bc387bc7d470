// Input contexts and the context stack
//
// A context names an action map and optionally carries commands: callbacks
// that are attached to the map's streams while the context is on top of the
// stack and detached as soon as it is not.

use super::graph::BindingGraph;
use super::stream::SubscriptionBag;
use super::InputError;
use glam::Vec2;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

type Command0 = Rc<RefCell<dyn FnMut()>>;

#[derive(Clone)]
enum Command {
    Button(String, Command0),
    LongPress(String, Command0),
    Vector2(String, Rc<RefCell<dyn FnMut(Vec2)>>),
    Scalar(String, Rc<RefCell<dyn FnMut(f32)>>),
}

impl Command {
    fn action(&self) -> &str {
        match self {
            Command::Button(action, _)
            | Command::LongPress(action, _)
            | Command::Vector2(action, _)
            | Command::Scalar(action, _) => action,
        }
    }
}

fn call0(command: &Command0) {
    match command.try_borrow_mut() {
        Ok(mut callback) => (&mut *callback)(),
        Err(_) => log::warn!("Skipping re-entrant command"),
    }
}

/// A named context with the commands it runs while active
#[derive(Clone)]
pub struct InputContext {
    name: String,
    map_id: String,
    commands: Vec<Command>,
}

impl InputContext {
    pub fn new(name: &str, map_id: &str) -> Self {
        Self {
            name: name.to_string(),
            map_id: map_id.to_string(),
            commands: Vec::new(),
        }
    }

    /// Run `command` on each activation of a button action
    pub fn on_button(mut self, action: &str, command: impl FnMut() + 'static) -> Self {
        self.commands
            .push(Command::Button(action.to_string(), Rc::new(RefCell::new(command))));
        self
    }

    /// Run `command` when an action is held past its long-press duration
    pub fn on_long_press(mut self, action: &str, command: impl FnMut() + 'static) -> Self {
        self.commands.push(Command::LongPress(
            action.to_string(),
            Rc::new(RefCell::new(command)),
        ));
        self
    }

    pub fn on_vector2(mut self, action: &str, command: impl FnMut(Vec2) + 'static) -> Self {
        self.commands
            .push(Command::Vector2(action.to_string(), Rc::new(RefCell::new(command))));
        self
    }

    pub fn on_scalar(mut self, action: &str, command: impl FnMut(f32) + 'static) -> Self {
        self.commands
            .push(Command::Scalar(action.to_string(), Rc::new(RefCell::new(command))));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn map_id(&self) -> &str {
        &self.map_id
    }

    pub fn command_count(&self) -> usize {
        self.commands.len()
    }

    /// Attach every command to its stream, preferring this context's map
    pub(crate) fn bind(&self, graph: &BindingGraph, bag: &mut SubscriptionBag) {
        for command in &self.commands {
            let map = Some(self.map_id.as_str());
            let action = command.action();

            let subscription = match command {
                Command::Button(_, callback) => graph
                    .lookup(map, action, |n| n.button_stream().is_some())
                    .and_then(|n| n.button_stream())
                    .map(|stream| {
                        let callback = Rc::clone(callback);
                        stream.subscribe(move |_| call0(&callback))
                    }),
                Command::LongPress(_, callback) => graph
                    .lookup(map, action, |n| n.has_long_press())
                    .and_then(|n| n.long_press_stream())
                    .map(|stream| {
                        let callback = Rc::clone(callback);
                        stream.subscribe(move |_| call0(&callback))
                    }),
                Command::Vector2(_, callback) => graph
                    .lookup(map, action, |n| n.vector2_stream().is_some())
                    .and_then(|n| n.vector2_stream())
                    .map(|stream| {
                        let callback = Rc::clone(callback);
                        stream.subscribe(move |value| match callback.try_borrow_mut() {
                            Ok(mut callback) => (&mut *callback)(*value),
                            Err(_) => log::warn!("Skipping re-entrant command"),
                        })
                    }),
                Command::Scalar(_, callback) => graph
                    .lookup(map, action, |n| n.scalar_stream().is_some())
                    .and_then(|n| n.scalar_stream())
                    .map(|stream| {
                        let callback = Rc::clone(callback);
                        stream.subscribe(move |value| match callback.try_borrow_mut() {
                            Ok(mut callback) => (&mut *callback)(*value),
                            Err(_) => log::warn!("Skipping re-entrant command"),
                        })
                    }),
            };

            match subscription {
                Some(subscription) => bag.add(subscription),
                None => log::warn!(
                    "Context '{}': no matching stream for action '{}'",
                    self.name,
                    action
                ),
            }
        }
    }
}

impl fmt::Debug for InputContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputContext")
            .field("name", &self.name)
            .field("map_id", &self.map_id)
            .field("commands", &self.commands.len())
            .finish()
    }
}

/// Registered contexts and the LIFO stack of active ones
///
/// Only the top of the stack is live. The stack itself does not touch the
/// binding graph; the router deactivates and activates around push and pop.
#[derive(Debug, Default)]
pub struct ContextStack {
    registered: HashMap<String, InputContext>,
    stack: Vec<String>,
    live: SubscriptionBag,
}

impl ContextStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a context, returns true if it replaced one with the same name
    pub fn register(&mut self, context: InputContext) -> bool {
        self.registered
            .insert(context.name.clone(), context)
            .is_some()
    }

    pub fn get(&self, name: &str) -> Option<&InputContext> {
        self.registered.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.registered.contains_key(name)
    }

    pub fn top(&self) -> Option<&InputContext> {
        self.stack.last().and_then(|name| self.registered.get(name))
    }

    pub fn top_name(&self) -> Option<&str> {
        self.stack.last().map(String::as_str)
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Stack contents, bottom first
    pub fn names(&self) -> &[String] {
        &self.stack
    }

    pub fn push(&mut self, name: &str) -> Result<(), InputError> {
        if !self.registered.contains_key(name) {
            return Err(InputError::UnknownContext(name.to_string()));
        }
        self.stack.push(name.to_string());
        Ok(())
    }

    pub fn pop(&mut self) -> Option<String> {
        self.stack.pop()
    }

    /// Attach the top context's commands
    pub fn activate_top(&mut self, graph: &BindingGraph) {
        self.live.clear();
        if let Some(top) = self.stack.last().and_then(|name| self.registered.get(name)) {
            top.bind(graph, &mut self.live);
        }
    }

    /// Detach the live commands
    pub fn deactivate(&mut self) {
        self.live.clear();
    }

    pub fn live_commands(&self) -> usize {
        self.live.len()
    }

    pub fn clear(&mut self) {
        self.live.clear();
        self.stack.clear();
    }
}
