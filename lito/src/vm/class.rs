use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::method::Callable;
use super::value::{Ivars, Pointer, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(u32);

impl ClassId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Bootstrap classes always occupy the first arena slots.
pub const OBJECT: ClassId = ClassId(0);
pub const CLASS: ClassId = ClassId(1);
pub const MODULE: ClassId = ClassId(2);

pub type MethodTable = Arc<RwLock<HashMap<String, Callable>>>;
pub type ConstantTable = Arc<RwLock<HashMap<String, Arc<Pointer>>>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClassLinks {
    /// `Class` for classes, `Module` for modules.
    pub class_of: ClassId,
    /// Method resolution parent; include/extend splice module copies in here.
    pub super_class: ClassId,
    /// Declared parent, reported by `superclass`.
    pub pseudo_super: ClassId,
    pub meta: Option<ClassId>,
    /// Lexically enclosing class.
    pub scope: Option<ClassId>,
    pub inherits_lookup: bool,
}

impl ClassLinks {
    fn plain() -> Self {
        Self {
            class_of: CLASS,
            super_class: OBJECT,
            pseudo_super: OBJECT,
            meta: None,
            scope: None,
            inherits_lookup: false,
        }
    }
}

#[derive(Debug)]
pub struct ClassRecord {
    pub id: ClassId,
    pub name: String,
    pub is_module: bool,
    methods: MethodTable,
    constants: ConstantTable,
    links: RwLock<ClassLinks>,
    pub ivars: Ivars,
}

impl ClassRecord {
    pub fn links(&self) -> ClassLinks {
        *self.links.read()
    }

    pub fn method(&self, name: &str) -> Option<Callable> {
        self.methods.read().get(name).cloned()
    }

    pub fn define(&self, name: impl Into<String>, method: Callable) {
        self.methods.write().insert(name.into(), method);
    }

    pub fn method_names(&self) -> Vec<String> {
        self.methods.read().keys().cloned().collect()
    }

    pub fn constant(&self, name: &str) -> Option<Arc<Pointer>> {
        self.constants.read().get(name).cloned()
    }

    pub fn set_constant(&self, name: impl Into<String>, value: Value) -> Arc<Pointer> {
        let pointer = Pointer::new(value);
        self.constants.write().insert(name.into(), pointer.clone());
        pointer
    }

    pub fn constant_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.constants.read().keys().cloned().collect();
        names.sort();
        names
    }
}

/// Arena of every class, metaclass and module the VM has created.
#[derive(Debug, Default)]
pub struct ClassTable {
    records: RwLock<Vec<Arc<ClassRecord>>>,
}

impl ClassTable {
    pub fn get(&self, id: ClassId) -> Arc<ClassRecord> {
        self.records.read()[id.index()].clone()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn alloc(
        &self,
        name: String,
        is_module: bool,
        links: ClassLinks,
        methods: MethodTable,
        constants: ConstantTable,
    ) -> ClassId {
        let mut records = self.records.write();
        let id = ClassId(records.len() as u32);
        records.push(Arc::new(ClassRecord {
            id,
            name,
            is_module,
            methods,
            constants,
            links: RwLock::new(links),
            ivars: Ivars::default(),
        }));
        id
    }

    /// A bare record: class `Class`, parent `Object`, no metaclass.
    pub fn create(&self, name: impl Into<String>) -> ClassId {
        self.alloc(
            name.into(),
            false,
            ClassLinks::plain(),
            MethodTable::default(),
            ConstantTable::default(),
        )
    }

    pub fn update(&self, id: ClassId, f: impl FnOnce(&mut ClassLinks)) {
        let record = self.get(id);
        let mut links = record.links.write();
        f(&mut links);
    }

    pub fn links(&self, id: ClassId) -> ClassLinks {
        self.get(id).links()
    }

    pub fn name(&self, id: ClassId) -> String {
        self.get(id).name.clone()
    }

    pub fn super_of(&self, id: ClassId) -> ClassId {
        self.links(id).super_class
    }

    pub fn meta_of(&self, id: ClassId) -> Option<ClassId> {
        self.links(id).meta
    }

    pub fn class_of(&self, id: ClassId) -> ClassId {
        self.links(id).class_of
    }

    /// New class with its own metaclass, inheriting `Object`.
    pub fn init_class(&self, name: &str) -> ClassId {
        let class = self.create(name);
        let meta = self.create(format!("#<Class:{name}>"));
        self.update(class, |links| links.meta = Some(meta));
        self.inherit(class, OBJECT);
        class
    }

    pub fn init_module(&self, name: &str) -> ClassId {
        let module = self.alloc(
            name.to_string(),
            true,
            ClassLinks {
                class_of: MODULE,
                ..ClassLinks::plain()
            },
            MethodTable::default(),
            ConstantTable::default(),
        );
        let meta = self.create(format!("#<Class:{name}>"));
        self.update(meta, |links| {
            links.super_class = MODULE;
            links.pseudo_super = MODULE;
        });
        self.update(module, |links| links.meta = Some(meta));
        module
    }

    pub fn inherit(&self, class: ClassId, parent: ClassId) {
        self.update(class, |links| {
            links.super_class = parent;
            links.pseudo_super = parent;
        });
        if let (Some(meta), Some(parent_meta)) = (self.meta_of(class), self.meta_of(parent)) {
            self.update(meta, |links| {
                links.super_class = parent_meta;
                links.pseudo_super = parent_meta;
            });
        }
    }

    /// Splices a node sharing `module`'s tables between `class` and its parent.
    pub fn splice_module(&self, class: ClassId, module: ClassId) -> ClassId {
        let source = self.get(module);
        let copy = self.alloc(
            source.name.clone(),
            true,
            ClassLinks {
                super_class: self.super_of(class),
                ..source.links()
            },
            source.methods.clone(),
            source.constants.clone(),
        );
        self.update(class, |links| links.super_class = copy);
        copy
    }

    pub fn define(&self, class: ClassId, name: impl Into<String>, method: Callable) {
        self.get(class).define(name, method);
    }

    /// Walks the parent chain until a class is its own parent.
    pub fn lookup_method(&self, class: ClassId, name: &str) -> Option<Callable> {
        let mut current = class;
        loop {
            let record = self.get(current);
            if let Some(method) = record.method(name) {
                return Some(method);
            }
            let parent = record.links().super_class;
            if parent == current {
                return None;
            }
            current = parent;
        }
    }

    /// True when `ancestor` appears above `class` before reaching `Object`.
    pub fn already_inherits(&self, class: ClassId, ancestor: ClassId) -> bool {
        let mut current = class;
        loop {
            let parent = self.super_of(current);
            if parent == ancestor || self.same_name(parent, ancestor) {
                return true;
            }
            if parent == OBJECT || parent == current {
                return false;
            }
            current = parent;
        }
    }

    fn same_name(&self, a: ClassId, b: ClassId) -> bool {
        let a = self.get(a);
        let b = self.get(b);
        a.is_module && b.is_module && a.name == b.name
    }

    pub fn is_a(&self, class: ClassId, target: ClassId) -> bool {
        let target_name = self.name(target);
        let mut current = class;
        loop {
            if current == target || self.get(current).name == target_name {
                return true;
            }
            let parent = self.super_of(current);
            if current == OBJECT || parent == current {
                return false;
            }
            current = parent;
        }
    }

    pub fn ancestors(&self, class: ClassId) -> Vec<ClassId> {
        let mut out = vec![class];
        let mut current = class;
        while current != OBJECT {
            let parent = self.super_of(current);
            if parent == current {
                break;
            }
            out.push(parent);
            current = parent;
        }
        out
    }

    pub fn constant_in_current_scope(&self, class: ClassId, name: &str) -> Option<Arc<Pointer>> {
        self.get(class).constant(name)
    }

    /// Own constants, then each lexically enclosing class.
    pub fn constant_under_current_scope(
        &self,
        class: ClassId,
        name: &str,
    ) -> Option<Arc<Pointer>> {
        let mut current = Some(class);
        while let Some(id) = current {
            let record = self.get(id);
            if let Some(pointer) = record.constant(name) {
                return Some(pointer);
            }
            current = record.links().scope;
        }
        None
    }

    pub fn constant_under_all_scope(&self, class: ClassId, name: &str) -> Option<Arc<Pointer>> {
        self.constant_under_current_scope(class, name)
    }

    /// Metaclass first, then the class's own class chain.
    pub fn find_class_method(&self, class: ClassId, name: &str, is_super: bool) -> Option<Callable> {
        let links = self.links(class);
        let mut meta = links.meta;
        let mut class_of = links.class_of;
        if is_super {
            class_of = self.super_of(class_of);
            meta = meta.map(|meta| self.super_of(meta));
        }
        meta.and_then(|meta| self.lookup_method(meta, name))
            .or_else(|| self.lookup_method(class_of, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bootstrap() -> ClassTable {
        let table = ClassTable::default();
        assert_eq!(table.create("Object"), OBJECT);
        assert_eq!(table.create("Class"), CLASS);
        assert_eq!(table.create("Module"), MODULE);
        table.update(OBJECT, |links| links.super_class = OBJECT);
        table.update(CLASS, |links| links.super_class = MODULE);
        table
    }

    #[test]
    fn subclasses_reach_object() {
        let table = bootstrap();
        let animal = table.init_class("Animal");
        let dog = table.init_class("Dog");
        table.inherit(dog, animal);
        assert_eq!(table.ancestors(dog), vec![dog, animal, OBJECT]);
        assert!(table.is_a(dog, animal));
        assert!(!table.is_a(animal, dog));
        assert!(table.already_inherits(dog, animal));
    }

    #[test]
    fn included_modules_share_methods_through_a_copy() {
        let table = bootstrap();
        let class = table.init_class("Widget");
        let module = table.init_module("Shiny");
        let copy = table.splice_module(class, module);
        assert_ne!(copy, module);
        assert_eq!(table.super_of(class), copy);
        assert_eq!(table.super_of(copy), OBJECT);
        assert_eq!(table.super_of(module), OBJECT);
        assert!(table.already_inherits(class, module));
    }
}
