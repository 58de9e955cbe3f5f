/*
 *  props/registry.rs
 *
 *  kioskd - the show must go on
 *  (c) 2020-26 Stuart Hunter
 *
 *  Registered prop types, keyed by the name each type reports
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
use log::{debug, info, warn};

use crate::error::KioskError;
use super::guard::catch_prop_call;
use super::traits::PropType;

/// The set of prop types that loaded and initialised.
///
/// Each entry is shared with every instance of that type, so a type
/// (and the module behind it) outlives its instances no matter which
/// side is dropped first.
#[derive(Default)]
pub struct TypeRegistry {
    /// Registration order
    types: Vec<Rc<dyn PropType>>,

    index: HashMap<String, usize>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Initialise a type and register it under the name it reports.
    ///
    /// A name that is already taken is refused before `init` runs.
    pub fn install(&mut self, prop_type: Rc<dyn PropType>) -> Result<String, KioskError> {
        let type_name = prop_type.type_name().to_string();

        if self.index.contains_key(&type_name) {
            warn!("Prop type '{}' is already registered, refusing duplicate", type_name);
            return Err(KioskError::DuplicateType(type_name));
        }

        catch_prop_call(|| prop_type.init()).map_err(|source| KioskError::PluginInitFailed {
            type_name: type_name.clone(),
            source,
        })?;

        self.index.insert(type_name.clone(), self.types.len());
        self.types.push(prop_type);

        info!("Registered prop type '{}'", type_name);
        Ok(type_name)
    }

    pub fn find(&self, type_name: &str) -> Option<Rc<dyn PropType>> {
        self.index.get(type_name).map(|&i| Rc::clone(&self.types[i]))
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.index.contains_key(type_name)
    }

    /// Type names in registration order
    pub fn names(&self) -> Vec<String> {
        self.types.iter().map(|t| t.type_name().to_string()).collect()
    }

    /// Shut every type down exactly once, most recently registered first,
    /// and empty the registry.
    pub fn teardown_all(&mut self) {
        self.index.clear();

        while let Some(prop_type) = self.types.pop() {
            let type_name = prop_type.type_name().to_string();
            debug!("Shutting down prop type '{}'", type_name);

            if let Err(e) = catch_prop_call(|| {
                prop_type.shutdown();
                Ok(())
            }) {
                warn!("Prop type '{}' failed to shut down: {}", type_name, e);
            }

            if Rc::strong_count(&prop_type) > 1 {
                warn!(
                    "Prop type '{}' still has {} live references at shutdown",
                    type_name,
                    Rc::strong_count(&prop_type) - 1
                );
            }
        }
    }
}

impl Drop for TypeRegistry {
    fn drop(&mut self) {
        self.teardown_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use kioskd_prop_api::{Payload, PropChanged};

    use crate::props::{PropData, PropError, PropView};
    use crate::surface::Surface;

    struct Probe {
        name: &'static str,
        fail_init: bool,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl PropType for Probe {
        fn type_name(&self) -> &str {
            self.name
        }

        fn init(&self) -> Result<(), PropError> {
            self.log.borrow_mut().push(format!("init {}", self.name));
            if self.fail_init {
                return Err(PropError::Failed("no display".into()));
            }
            Ok(())
        }

        fn shutdown(&self) {
            self.log.borrow_mut().push(format!("shutdown {}", self.name));
        }

        fn instance_init(&self, _prop: PropView<'_>) -> Result<PropData, PropError> {
            Ok(Box::new(()))
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

        fn instance_destroy(&self, _prop: PropView<'_>, _data: PropData) {}
    }

    fn probe(name: &'static str, log: &Rc<RefCell<Vec<String>>>) -> Rc<dyn PropType> {
        Rc::new(Probe { name, fail_init: false, log: Rc::clone(log) })
    }

    #[test]
    fn test_install_and_find() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut registry = TypeRegistry::new();

        assert_eq!(registry.install(probe("text", &log)).unwrap(), "text");
        assert_eq!(registry.install(probe("image", &log)).unwrap(), "image");

        assert!(registry.find("text").is_some());
        assert!(registry.find("video").is_none());
        assert_eq!(registry.names(), vec!["text", "image"]);
        assert_eq!(*log.borrow(), vec!["init text", "init image"]);
    }

    #[test]
    fn test_duplicate_refused_before_init() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut registry = TypeRegistry::new();

        registry.install(probe("text", &log)).unwrap();
        let err = registry.install(probe("text", &log)).unwrap_err();

        assert!(matches!(err, KioskError::DuplicateType(ref n) if n == "text"));
        assert_eq!(registry.len(), 1);
        assert_eq!(*log.borrow(), vec!["init text"]);
    }

    #[test]
    fn test_failed_init_not_registered() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut registry = TypeRegistry::new();

        let broken = Rc::new(Probe { name: "video", fail_init: true, log: Rc::clone(&log) });
        let err = registry.install(broken).unwrap_err();

        assert!(matches!(err, KioskError::PluginInitFailed { .. }));
        assert!(registry.is_empty());
        assert!(!registry.contains("video"));
    }

    #[test]
    fn test_teardown_calls_shutdown_once_each() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut registry = TypeRegistry::new();
        registry.install(probe("generic", &log)).unwrap();
        registry.install(probe("text", &log)).unwrap();

        registry.teardown_all();
        registry.teardown_all();
        drop(registry);

        let shutdowns: Vec<_> = log.borrow().iter().filter(|l| l.starts_with("shutdown")).cloned().collect();
        assert_eq!(shutdowns, vec!["shutdown text", "shutdown generic"]);
    }
}
