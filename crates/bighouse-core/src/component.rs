//! Component identifiers and registry.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::handler::EventHandler;

/// Identifier of a simulation component.
pub type Id = u32;

/// Names of registered components indexed by their identifiers, shared with contexts.
pub(crate) type ComponentNames = Rc<RefCell<Vec<String>>>;

// Components are registered on first mention by name, either by a context or by a handler.
pub(crate) struct ComponentRegistry<E> {
    ids: HashMap<String, Id>,
    names: ComponentNames,
    handlers: Vec<Option<Rc<RefCell<dyn EventHandler<E>>>>>,
}

impl<E> ComponentRegistry<E> {
    pub fn new() -> Self {
        Self {
            ids: HashMap::new(),
            names: Rc::new(RefCell::new(Vec::new())),
            handlers: Vec::new(),
        }
    }

    pub fn id_or_register(&mut self, name: &str) -> Id {
        if let Some(id) = self.ids.get(name) {
            return *id;
        }
        let id = self.handlers.len() as Id;
        self.ids.insert(name.to_owned(), id);
        self.names.borrow_mut().push(name.to_owned());
        self.handlers.push(None);
        id
    }

    pub fn set_handler(&mut self, id: Id, handler: Rc<RefCell<dyn EventHandler<E>>>) {
        self.handlers[id as usize] = Some(handler);
    }

    pub fn handler(&self, id: Id) -> Option<Rc<RefCell<dyn EventHandler<E>>>> {
        self.handlers.get(id as usize).and_then(|h| h.clone())
    }

    pub fn id(&self, name: &str) -> Option<Id> {
        self.ids.get(name).copied()
    }

    pub fn name(&self, id: Id) -> String {
        self.names.borrow()[id as usize].clone()
    }

    pub fn names(&self) -> ComponentNames {
        self.names.clone()
    }
}
