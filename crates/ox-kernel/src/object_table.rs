//! Guest kernel object lifetime management

use ox_core::error::KernelError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Guest object handle type
pub type Handle = u32;

/// First handle value. Host-side objects live above the guest address
/// range so a handle can never be mistaken for a pointer.
pub const HANDLE_BASE: Handle = 0xF800_0000;

/// Handles advance in steps of 4, matching the alignment guests assume.
const HANDLE_STRIDE: u32 = 4;

/// Kernel object types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    Event,
    File,
    Module,
    Mutant,
    Semaphore,
    Thread,
    Timer,
}

/// Trait for kernel objects
pub trait KernelObject: Send + Sync + std::any::Any {
    fn object_type(&self) -> ObjectType;
    fn handle(&self) -> Handle;

    /// Helper for downcasting
    fn as_any(self: Arc<Self>) -> Arc<dyn std::any::Any + Send + Sync>;
}

/// Table of live guest objects, keyed by handle
pub struct ObjectTable {
    next_handle: AtomicU32,
    objects: RwLock<HashMap<Handle, Arc<dyn KernelObject>>>,
}

impl ObjectTable {
    /// Create an empty object table
    pub fn new() -> Self {
        Self {
            next_handle: AtomicU32::new(HANDLE_BASE),
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Reserve the next free handle
    pub fn allocate_handle(&self) -> Handle {
        self.next_handle.fetch_add(HANDLE_STRIDE, Ordering::Relaxed)
    }

    /// Register a kernel object under its own handle
    pub fn register(&self, object: Arc<dyn KernelObject>) -> Handle {
        let handle = object.handle();
        self.objects.write().insert(handle, object);
        handle
    }

    /// Unregister a kernel object
    pub fn unregister(&self, handle: Handle) -> Result<(), KernelError> {
        self.objects
            .write()
            .remove(&handle)
            .ok_or(KernelError::InvalidHandle(handle))?;
        Ok(())
    }

    /// Get a kernel object by handle, downcast to its concrete type
    pub fn get<T: KernelObject + 'static>(&self, handle: Handle) -> Result<Arc<T>, KernelError> {
        let objects = self.objects.read();
        let object = objects
            .get(&handle)
            .ok_or(KernelError::InvalidHandle(handle))?;

        let any = Arc::clone(object).as_any();
        any.downcast::<T>()
            .map_err(|_| KernelError::ObjectTypeMismatch(handle))
    }

    /// All live objects of one type, downcast to the concrete type
    pub fn objects_by_type<T: KernelObject + 'static>(&self, object_type: ObjectType) -> Vec<Arc<T>> {
        self.objects
            .read()
            .values()
            .filter(|object| object.object_type() == object_type)
            .filter_map(|object| Arc::clone(object).as_any().downcast::<T>().ok())
            .collect()
    }

    /// Check if a handle refers to a live object
    pub fn exists(&self, handle: Handle) -> bool {
        self.objects.read().contains_key(&handle)
    }

    /// Get count of live objects
    pub fn count(&self) -> usize {
        self.objects.read().len()
    }

    /// Get count of live objects by type
    pub fn count_by_type(&self, object_type: ObjectType) -> usize {
        self.objects
            .read()
            .values()
            .filter(|object| object.object_type() == object_type)
            .count()
    }
}

impl Default for ObjectTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestObject {
        handle: Handle,
        object_type: ObjectType,
    }

    impl KernelObject for TestObject {
        fn object_type(&self) -> ObjectType {
            self.object_type
        }

        fn handle(&self) -> Handle {
            self.handle
        }

        fn as_any(self: Arc<Self>) -> Arc<dyn std::any::Any + Send + Sync> {
            self
        }
    }

    #[test]
    fn test_handle_allocation() {
        let table = ObjectTable::new();
        let first = table.allocate_handle();
        let second = table.allocate_handle();
        assert_eq!(first, HANDLE_BASE);
        assert_eq!(second, HANDLE_BASE + 4);
    }

    #[test]
    fn test_register_and_get() {
        let table = ObjectTable::new();

        let event = Arc::new(TestObject {
            handle: table.allocate_handle(),
            object_type: ObjectType::Event,
        });
        let handle = event.handle();

        table.register(Arc::clone(&event) as Arc<dyn KernelObject>);

        assert!(table.exists(handle));
        assert_eq!(table.count(), 1);

        let retrieved: Arc<TestObject> = table.get(handle).unwrap();
        assert_eq!(retrieved.handle(), handle);

        table.unregister(handle).unwrap();
        assert!(!table.exists(handle));
        assert_eq!(table.count(), 0);
    }

    #[test]
    fn test_unknown_handle() {
        let table = ObjectTable::new();
        assert!(matches!(
            table.unregister(0xDEAD_BEEF),
            Err(KernelError::InvalidHandle(0xDEAD_BEEF))
        ));
        assert!(table.get::<TestObject>(0xDEAD_BEEF).is_err());
    }

    #[test]
    fn test_wrong_concrete_type() {
        struct OtherObject {
            handle: Handle,
        }

        impl KernelObject for OtherObject {
            fn object_type(&self) -> ObjectType {
                ObjectType::Timer
            }

            fn handle(&self) -> Handle {
                self.handle
            }

            fn as_any(self: Arc<Self>) -> Arc<dyn std::any::Any + Send + Sync> {
                self
            }
        }

        let table = ObjectTable::new();
        let object = Arc::new(TestObject {
            handle: table.allocate_handle(),
            object_type: ObjectType::Event,
        });
        let handle = table.register(object as Arc<dyn KernelObject>);

        assert!(matches!(
            table.get::<OtherObject>(handle),
            Err(KernelError::ObjectTypeMismatch(h)) if h == handle
        ));
    }

    #[test]
    fn test_objects_by_type() {
        let table = ObjectTable::new();

        for object_type in [ObjectType::Thread, ObjectType::Thread, ObjectType::Event] {
            let object = Arc::new(TestObject {
                handle: table.allocate_handle(),
                object_type,
            });
            table.register(object as Arc<dyn KernelObject>);
        }

        assert_eq!(table.count(), 3);
        assert_eq!(table.count_by_type(ObjectType::Thread), 2);
        assert_eq!(table.count_by_type(ObjectType::Event), 1);
        assert_eq!(table.objects_by_type::<TestObject>(ObjectType::Thread).len(), 2);
    }
}
