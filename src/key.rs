//! Opaque cell keys (§3 "Key", §9 "Keyed state sharing with cycles").
//!
//! Equal keys mean equal cells: they share the same [`crate::state::CellStateCore`]-backed
//! state object and the same observers. A [`ValueKey`] is the concrete key
//! kind used throughout this crate (grounded in `live_cells/keys.py`'s
//! `ValueKey`): it is distinguished from other keys of the same Rust type
//! by an argument tuple `A` compared with `PartialEq`.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// Type-erased equality/hash for a key's argument payload.
pub trait KeyObject: fmt::Debug {
    fn eq_dyn(&self, other: &dyn KeyObject) -> bool;
    fn hash_dyn(&self, state: &mut dyn Hasher);
    fn as_any(&self) -> &dyn Any;
}

/// A cell key: either absent (the cell shares state with nobody) or a
/// [`ValueKey`]-shaped value compared by the argument tuple it carries.
#[derive(Clone)]
pub struct Key(Rc<dyn KeyObject>);

impl Key {
    pub fn new<K: KeyObject + 'static>(key: K) -> Self {
        Key(Rc::new(key))
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_dyn(other.0.as_ref())
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash_dyn(&mut HasherRef(state));
    }
}

/// Adapts a concrete `&mut H` into a `&mut dyn Hasher`-friendly shape so
/// [`KeyObject::hash_dyn`] can feed generically-typed argument tuples into
/// whatever hasher the caller's `HashMap` uses.
struct HasherRef<'a>(&'a mut dyn Hasher);

impl Hasher for HasherRef<'_> {
    fn finish(&self) -> u64 {
        self.0.finish()
    }
    fn write(&mut self, bytes: &[u8]) {
        self.0.write(bytes)
    }
}

/// A key distinguished from other keys of the same kind (`K`, usually a
/// unit-like marker type naming the combinator) by the argument tuple `A`.
///
/// Mirrors `ValueKey(*args)` from `live_cells/keys.py`: two `ValueKey<K, A>`
/// values are equal iff they carry the same Rust type `(K, A)` and `A`
/// compares equal.
pub struct ValueKey<K, A> {
    pub args: A,
    _kind: std::marker::PhantomData<K>,
}

impl<K, A> ValueKey<K, A> {
    pub fn new(args: A) -> Self {
        Self {
            args,
            _kind: std::marker::PhantomData,
        }
    }
}

impl<K: 'static, A: fmt::Debug + 'static> fmt::Debug for ValueKey<K, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueKey")
            .field("kind", &std::any::type_name::<K>())
            .field("args", &self.args)
            .finish()
    }
}

impl<K: 'static, A: PartialEq + Hash + fmt::Debug + 'static> KeyObject for ValueKey<K, A> {
    fn eq_dyn(&self, other: &dyn KeyObject) -> bool {
        other
            .as_any()
            .downcast_ref::<ValueKey<K, A>>()
            .is_some_and(|o| self.args == o.args)
    }

    fn hash_dyn(&self, mut state: &mut dyn Hasher) {
        std::any::TypeId::of::<K>().hash(&mut state);
        self.args.hash(&mut state);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Build a [`Key`] from a kind marker type and an argument tuple in one call.
pub fn value_key<K: 'static, A: PartialEq + Hash + fmt::Debug + 'static>(args: A) -> Key {
    Key::new(ValueKey::<K, A>::new(args))
}
