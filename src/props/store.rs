/*
 *  props/store.rs
 *
 *  kioskd - the show must go on
 *  (c) 2020-26 Stuart Hunter
 *
 *  Live prop instances, keyed by (type, name)
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use std::collections::HashMap;
use std::rc::Rc;
use log::{debug, error, warn};

use crate::error::KioskError;
use super::guard::catch_prop_call;
use super::registry::TypeRegistry;
use super::traits::{Geometry, PropData, PropType, PropView};

/// Identity of an instance; unique across the whole store
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropKey {
    pub type_name: String,
    pub name: String,
}

impl PropKey {
    pub fn new(type_name: &str, name: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            name: name.to_string(),
        }
    }
}

/// One live prop
pub struct PropInstance {
    prop_type: Rc<dyn PropType>,
    key: PropKey,
    geometry: Geometry,

    /// `None` only while being destroyed
    data: Option<PropData>,

    /// Set while render keeps failing, to keep the log quiet
    pub(crate) render_failing: bool,
}

impl PropInstance {
    pub fn type_name(&self) -> &str {
        &self.key.type_name
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn key(&self) -> &PropKey {
        &self.key
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub(crate) fn geometry_mut(&mut self) -> &mut Geometry {
        &mut self.geometry
    }

    pub fn view(&self) -> PropView<'_> {
        PropView {
            name: &self.key.name,
            geometry: self.geometry,
        }
    }

    /// Split borrow for calls into the type: the type, a view of the
    /// instance and its private state.
    pub(crate) fn parts(&mut self) -> Option<(&dyn PropType, PropView<'_>, &mut PropData)> {
        let view = PropView {
            name: &self.key.name,
            geometry: self.geometry,
        };
        let data = self.data.as_mut()?;
        Some((self.prop_type.as_ref(), view, data))
    }
}

impl Drop for PropInstance {
    fn drop(&mut self) {
        let Some(data) = self.data.take() else {
            return;
        };

        debug!("Destroying prop '{}' of type '{}'", self.key.name, self.key.type_name);

        let view = PropView {
            name: &self.key.name,
            geometry: self.geometry,
        };
        let prop_type = &self.prop_type;
        if let Err(e) = catch_prop_call(|| {
            prop_type.instance_destroy(view, data);
            Ok(())
        }) {
            warn!("Prop '{}' failed to tear down: {}", self.key.name, e);
        }
    }
}

/// All live instances.
///
/// Kept in creation order; [`InstanceStore::iter`] walks them most recent
/// first, which is also the render order.
#[derive(Default)]
pub struct InstanceStore {
    instances: Vec<PropInstance>,
    index: HashMap<PropKey, usize>,
}

impl InstanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn contains(&self, type_name: &str, name: &str) -> bool {
        self.index.contains_key(&PropKey::new(type_name, name))
    }

    pub fn get(&self, type_name: &str, name: &str) -> Option<&PropInstance> {
        let i = *self.index.get(&PropKey::new(type_name, name))?;
        self.instances.get(i)
    }

    pub fn get_mut(&mut self, type_name: &str, name: &str) -> Option<&mut PropInstance> {
        let i = *self.index.get(&PropKey::new(type_name, name))?;
        self.instances.get_mut(i)
    }

    /// Find the instance for (type, name), creating it if it does not exist.
    ///
    /// The flag is true when the instance was created by this call. A failed
    /// `instance_init` leaves the store untouched.
    pub fn get_or_create(
        &mut self,
        registry: &TypeRegistry,
        type_name: &str,
        name: &str,
    ) -> Result<(&mut PropInstance, bool), KioskError> {
        let prop_type = registry
            .find(type_name)
            .ok_or_else(|| KioskError::TypeNotFound(type_name.to_string()))?;

        let key = PropKey::new(type_name, name);
        if let Some(&i) = self.index.get(&key) {
            return Ok((&mut self.instances[i], false));
        }

        let geometry = Geometry::default();
        let view = PropView { name, geometry };
        let data = catch_prop_call(|| prop_type.instance_init(view)).map_err(|source| {
            KioskError::InstanceInitFailed {
                type_name: type_name.to_string(),
                name: name.to_string(),
                source,
            }
        })?;

        debug!("Created prop '{}' of type '{}'", name, type_name);

        let i = self.instances.len();
        self.index.insert(key.clone(), i);
        self.instances.push(PropInstance {
            prop_type,
            key,
            geometry,
            data: Some(data),
            render_failing: false,
        });

        Ok((&mut self.instances[i], true))
    }

    /// Every live instance, most recently created first
    pub fn iter(&self) -> impl Iterator<Item = &PropInstance> {
        self.instances.iter().rev()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PropInstance> {
        self.instances.iter_mut().rev()
    }

    /// Remove an instance and hand its state back to its type.
    ///
    /// Asking for an instance that is not here is a logic error upstream;
    /// it is logged and reported, never fatal.
    pub fn unlink_and_destroy(&mut self, type_name: &str, name: &str) -> Result<(), KioskError> {
        let Some(i) = self.index.remove(&PropKey::new(type_name, name)) else {
            error!("Prop '{}' of type '{}' is not in the store", name, type_name);
            return Err(KioskError::InstanceNotFound {
                type_name: type_name.to_string(),
                name: name.to_string(),
            });
        };

        let instance = self.instances.remove(i);
        for slot in self.index.values_mut() {
            if *slot > i {
                *slot -= 1;
            }
        }

        drop(instance);
        Ok(())
    }

    /// Destroy every instance, most recently created first
    pub fn teardown(&mut self) {
        self.index.clear();
        while let Some(instance) = self.instances.pop() {
            drop(instance);
        }
    }
}

impl Drop for InstanceStore {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use kioskd_prop_api::{Payload, PropChanged};

    use crate::props::PropError;
    use crate::surface::Surface;

    /// Records instance lifecycle calls; refuses to create "refuse"
    struct Recorder {
        log: Rc<RefCell<Vec<String>>>,
    }

    impl PropType for Recorder {
        fn type_name(&self) -> &str {
            "text"
        }

        fn init(&self) -> Result<(), PropError> {
            Ok(())
        }

        fn shutdown(&self) {}

        fn instance_init(&self, prop: PropView<'_>) -> Result<PropData, PropError> {
            if prop.name == "refuse" {
                return Err(PropError::Failed("out of textures".into()));
            }
            self.log.borrow_mut().push(format!("init {}", prop.name));
            Ok(Box::new(prop.name.to_string()))
        }

        fn instance_update(
            &self,
            _prop: PropView<'_>,
            _data: &mut PropData,
            _payload: &Payload,
            _surface: &mut Surface,
            _changed: PropChanged,
        ) -> Result<(), PropError> {
            Ok(())
        }

        fn instance_render(
            &self,
            _prop: PropView<'_>,
            _data: &mut PropData,
            _surface: &mut Surface,
        ) -> Result<(), PropError> {
            Ok(())
        }

        fn instance_destroy(&self, prop: PropView<'_>, data: PropData) {
            let owner = data.downcast::<String>().map(|s| *s).unwrap_or_default();
            assert_eq!(owner, prop.name);
            self.log.borrow_mut().push(format!("destroy {}", prop.name));
        }
    }

    fn setup() -> (TypeRegistry, Rc<RefCell<Vec<String>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut registry = TypeRegistry::new();
        registry.install(Rc::new(Recorder { log: Rc::clone(&log) })).unwrap();
        (registry, log)
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let (registry, log) = setup();
        let mut store = InstanceStore::new();

        let (_, created) = store.get_or_create(&registry, "text", "clock").unwrap();
        assert!(created);
        let (instance, created) = store.get_or_create(&registry, "text", "clock").unwrap();
        assert!(!created);
        assert_eq!(instance.geometry(), Geometry::default());

        assert_eq!(store.len(), 1);
        assert_eq!(*log.borrow(), vec!["init clock"]);
    }

    #[test]
    fn test_unknown_type() {
        let (registry, _) = setup();
        let mut store = InstanceStore::new();

        let err = store.get_or_create(&registry, "video", "intro").err().unwrap();
        assert!(matches!(err, KioskError::TypeNotFound(ref t) if t == "video"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_failed_instance_init_not_linked() {
        let (registry, _) = setup();
        let mut store = InstanceStore::new();

        let err = store.get_or_create(&registry, "text", "refuse").err().unwrap();
        assert!(matches!(err, KioskError::InstanceInitFailed { .. }));
        assert!(!store.contains("text", "refuse"));
    }

    #[test]
    fn test_iter_most_recent_first() {
        let (registry, _) = setup();
        let mut store = InstanceStore::new();
        for name in ["a", "b", "c"] {
            store.get_or_create(&registry, "text", name).unwrap();
        }

        let names: Vec<_> = store.iter().map(|p| p.name().to_string()).collect();
        assert_eq!(names, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_unlink_keeps_index_consistent() {
        let (registry, log) = setup();
        let mut store = InstanceStore::new();
        for name in ["a", "b", "c"] {
            store.get_or_create(&registry, "text", name).unwrap();
        }

        store.unlink_and_destroy("text", "a").unwrap();
        assert!(!store.contains("text", "a"));
        assert_eq!(store.get("text", "c").map(|p| p.name()), Some("c"));
        assert_eq!(store.get("text", "b").map(|p| p.name()), Some("b"));
        assert!(log.borrow().contains(&"destroy a".to_string()));

        let err = store.unlink_and_destroy("text", "a").unwrap_err();
        assert!(matches!(err, KioskError::InstanceNotFound { .. }));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_teardown_destroys_most_recent_first() {
        let (registry, log) = setup();
        let mut store = InstanceStore::new();
        for name in ["a", "b"] {
            store.get_or_create(&registry, "text", name).unwrap();
        }

        store.teardown();
        assert!(store.is_empty());

        let destroys: Vec<_> = log.borrow().iter().filter(|l| l.starts_with("destroy")).cloned().collect();
        assert_eq!(destroys, vec!["destroy b", "destroy a"]);
    }
}
