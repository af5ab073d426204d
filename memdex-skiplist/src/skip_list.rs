use std::{
    alloc::Layout,
    cell::UnsafeCell,
    mem::{self, MaybeUninit},
    ptr::{NonNull, addr_of, addr_of_mut, null_mut},
    sync::Arc,
};

use rand::rngs::StdRng;

use crate::{
    arena::Arena,
    atomic_slot::AtomicSlot,
    comparator::prelude::*,
    error::{Error, Result},
    random::{RandomSource, default_source},
};

pub const MAX_HEIGHT: usize = 12;

/// A node reaches level `n + 1` with probability `1 / BRANCHING` from level `n`.
pub const BRANCHING: u32 = 4;

// Only the first `height` entries of `tower` are allocated. Nodes are handled
// through raw pointers so nothing ever borrows past the allocation.
#[repr(C)]
struct Node<K> {
    key: MaybeUninit<K>,
    height: usize,
    tower: [AtomicSlot<Node<K>>; MAX_HEIGHT],
}

impl<K> Node<K> {
    fn layout(height: usize) -> Layout {
        assert!((1..=MAX_HEIGHT).contains(&height));
        let size =
            mem::size_of::<Self>() - mem::size_of::<AtomicSlot<Self>>() * (MAX_HEIGHT - height);
        let align = mem::align_of::<Self>();
        Layout::from_size_align(size, align)
            .unwrap_or_else(|_| panic!("Layout error, size: {size}, align: {align}"))
    }

    fn new_in(key: MaybeUninit<K>, height: usize, arena: &Arena) -> NonNull<Self> {
        let p = arena.allocate_layout(Self::layout(height)).cast::<Self>();
        unsafe {
            let raw = p.as_ptr();
            addr_of_mut!((*raw).key).write(key);
            addr_of_mut!((*raw).height).write(height);
            let tower = addr_of_mut!((*raw).tower).cast::<AtomicSlot<Self>>();
            for level in 0..height {
                tower.add(level).write(AtomicSlot::null());
            }
        }
        p
    }

    /// # Safety
    ///
    /// `this` must be a live node and `level` below its height.
    unsafe fn slot<'a>(this: *mut Self, level: usize) -> &'a AtomicSlot<Self> {
        unsafe {
            debug_assert!(level < *addr_of!((*this).height));
            &*addr_of!((*this).tower)
                .cast::<AtomicSlot<Self>>()
                .add(level)
        }
    }

    unsafe fn next(this: *mut Self, level: usize) -> *mut Self {
        unsafe { Self::slot(this, level).acquire_load() }
    }

    unsafe fn set_next(this: *mut Self, level: usize, x: *mut Self) {
        unsafe { Self::slot(this, level).release_store(x) }
    }

    unsafe fn next_relaxed(this: *mut Self, level: usize) -> *mut Self {
        unsafe { Self::slot(this, level).relaxed_load() }
    }

    unsafe fn set_next_relaxed(this: *mut Self, level: usize, x: *mut Self) {
        unsafe { Self::slot(this, level).relaxed_store(x) }
    }

    /// # Safety
    ///
    /// `this` must be a live node other than the head.
    unsafe fn key<'a>(this: *mut Self) -> &'a K {
        unsafe { (*addr_of!((*this).key)).assume_init_ref() }
    }
}

/// Ordered set of keys backed by an [`Arena`].
///
/// Any number of readers may search and iterate concurrently with one writer
/// and without locking. Inserting needs either `&mut SkipList` or the unique
/// [`Writer`] obtained from [`SkipList::into_shared`]. Entries are never
/// removed; keys are dropped together with the list.
pub struct SkipList<K, C, R = StdRng> {
    head: NonNull<Node<K>>,
    // Written only by the writer; readers tolerate a stale value.
    max_height: AtomicSlot<()>,
    c: C,
    // Both touched only by the writer.
    rng: UnsafeCell<R>,
    arena: Arena,
}

unsafe impl<K, C, R> Send for SkipList<K, C, R>
where
    K: Send,
    C: Send,
    R: Send,
{
}

// Shared references only read nodes, the height and the arena statistic.
unsafe impl<K, C, R> Sync for SkipList<K, C, R>
where
    K: Send + Sync,
    C: Sync,
    R: Send,
{
}

impl<K, C> SkipList<K, C, StdRng>
where
    C: Comparator<Item = K>,
{
    pub fn new(c: C, arena: Arena) -> Self {
        Self::with_rng(c, arena, default_source())
    }
}

impl<K, C> Default for SkipList<K, C, StdRng>
where
    C: Comparator<Item = K> + Default,
{
    fn default() -> Self {
        Self::new(C::default(), Arena::default())
    }
}

impl<K, C, R> SkipList<K, C, R>
where
    C: Comparator<Item = K>,
    R: RandomSource,
{
    pub fn with_rng(c: C, arena: Arena, rng: R) -> Self {
        let head = Node::new_in(MaybeUninit::uninit(), MAX_HEIGHT, &arena);
        SkipList {
            head,
            max_height: AtomicSlot::word(1),
            c,
            rng: UnsafeCell::new(rng),
            arena,
        }
    }

    /// Inserts `key`, or returns [`Error::DuplicateKey`] leaving the list as
    /// it was.
    pub fn insert(&mut self, key: K) -> Result<()> {
        // SAFETY: `&mut self` excludes every other writer.
        unsafe { self.insert_exclusive(key) }
    }

    /// Splits the list into a shared read handle and its only writer.
    pub fn into_shared(self) -> (Arc<Self>, Writer<K, C, R>) {
        let list = Arc::new(self);
        (list.clone(), Writer { list })
    }

    /// # Safety
    ///
    /// No other insert may run on this list at the same time.
    unsafe fn insert_exclusive(&self, key: K) -> Result<()> {
        let mut prev = [null_mut(); MAX_HEIGHT];
        let x = self.find_greater_or_equal(&key, Some(&mut prev));
        if !x.is_null() && self.c.compare(&key, unsafe { Node::key(x) }).is_eq() {
            return Err(Error::DuplicateKey);
        }

        let height = unsafe { self.random_height() };
        let max_height = self.max_height();
        if height > max_height {
            prev[max_height..height].fill(self.head.as_ptr());
            // A reader that sees the new height before the links below finds
            // null at the head and simply drops a level.
            self.max_height.relaxed_store_word(height);
            tracing::trace!("skip list height raised from {} to {}", max_height, height);
        }

        let node = Node::new_in(MaybeUninit::new(key), height, &self.arena).as_ptr();
        unsafe {
            // Not reachable yet, relaxed stores suffice.
            for (level, &p) in prev.iter().enumerate().take(height) {
                Node::set_next_relaxed(node, level, Node::next_relaxed(p, level));
            }
            for (level, &p) in prev.iter().enumerate().take(height) {
                Node::set_next(p, level, node);
            }
        }
        Ok(())
    }

    unsafe fn random_height(&self) -> usize {
        let rng = unsafe { &mut *self.rng.get() };
        let mut height = 1;
        while height < MAX_HEIGHT && rng.uniform(BRANCHING) == 0 {
            height += 1;
        }
        height
    }
}

impl<K, C, R> SkipList<K, C, R>
where
    C: Comparator<Item = K>,
{
    fn max_height(&self) -> usize {
        self.max_height.relaxed_load_word()
    }

    pub fn contains(&self, key: &K) -> bool {
        let x = self.find_greater_or_equal(key, None);
        !x.is_null() && self.c.compare(key, unsafe { Node::key(x) }).is_eq()
    }

    pub fn cursor(&self) -> Cursor<'_, K, C, R> {
        Cursor::new(self)
    }

    pub fn iter(&self) -> Iter<'_, K, C, R> {
        Iter {
            cursor: self.cursor(),
            started: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        unsafe { Node::next(self.head.as_ptr(), 0).is_null() }
    }

    pub fn memory_usage(&self) -> usize {
        self.arena.memory_usage()
    }

    fn key_is_after_node(&self, key: &K, n: *mut Node<K>) -> bool {
        !n.is_null() && self.c.compare(unsafe { Node::key(n) }, key).is_lt()
    }

    /// First node with a key `>= key`, or null. Fills `prev` with the last
    /// node before it on every level in use.
    fn find_greater_or_equal(
        &self,
        key: &K,
        mut prev: Option<&mut [*mut Node<K>; MAX_HEIGHT]>,
    ) -> *mut Node<K> {
        let mut x = self.head.as_ptr();
        let mut level = self.max_height() - 1;
        loop {
            let next = unsafe { Node::next(x, level) };
            if self.key_is_after_node(key, next) {
                x = next;
                continue;
            }

            if let Some(prev) = prev.as_deref_mut() {
                prev[level] = x;
            }
            if level == 0 {
                return next;
            }
            level -= 1;
        }
    }

    /// Last node with a key `< key`, or the head.
    fn find_less_than(&self, key: &K) -> *mut Node<K> {
        let mut x = self.head.as_ptr();
        let mut level = self.max_height() - 1;
        loop {
            let next = unsafe { Node::next(x, level) };
            if next.is_null() || self.c.compare(unsafe { Node::key(next) }, key).is_ge() {
                if level == 0 {
                    return x;
                }
                level -= 1;
            } else {
                x = next;
            }
        }
    }

    /// Last node of the list, or the head when empty.
    fn find_last(&self) -> *mut Node<K> {
        let mut x = self.head.as_ptr();
        let mut level = self.max_height() - 1;
        loop {
            let next = unsafe { Node::next(x, level) };
            if next.is_null() {
                if level == 0 {
                    return x;
                }
                level -= 1;
            } else {
                x = next;
            }
        }
    }

    fn first(&self) -> *mut Node<K> {
        unsafe { Node::next(self.head.as_ptr(), 0) }
    }

    fn head_to_null(&self, x: *mut Node<K>) -> *mut Node<K> {
        if x == self.head.as_ptr() { null_mut() } else { x }
    }
}

impl<K, C, R> Drop for SkipList<K, C, R> {
    fn drop(&mut self) {
        if !mem::needs_drop::<K>() {
            return;
        }

        // The arena frees the memory afterwards; only the keys need dropping.
        unsafe {
            let mut cur = Node::next_relaxed(self.head.as_ptr(), 0);
            while !cur.is_null() {
                let next = Node::next_relaxed(cur, 0);
                (*addr_of_mut!((*cur).key)).assume_init_drop();
                cur = next;
            }
        }
    }
}

/// The single handle allowed to insert into a shared [`SkipList`].
pub struct Writer<K, C, R = StdRng> {
    list: Arc<SkipList<K, C, R>>,
}

impl<K, C, R> Writer<K, C, R>
where
    C: Comparator<Item = K>,
    R: RandomSource,
{
    pub fn insert(&mut self, key: K) -> Result<()> {
        // SAFETY: `Writer` is not `Clone` and `into_shared` consumed the only
        // other path to `insert_exclusive`.
        unsafe { self.list.insert_exclusive(key) }
    }

    pub fn list(&self) -> &Arc<SkipList<K, C, R>> {
        &self.list
    }
}

/// Positioned traversal over a [`SkipList`].
///
/// A fresh cursor is unpositioned; running off either end exhausts it. Both
/// states report `!is_valid()`. Inserts made while a cursor is alive may or
/// may not be observed by it.
pub struct Cursor<'a, K, C, R = StdRng> {
    list: &'a SkipList<K, C, R>,
    node: *mut Node<K>,
}

unsafe impl<K, C, R> Send for Cursor<'_, K, C, R> where SkipList<K, C, R>: Sync {}

unsafe impl<K, C, R> Sync for Cursor<'_, K, C, R> where SkipList<K, C, R>: Sync {}

impl<'a, K, C, R> Cursor<'a, K, C, R>
where
    C: Comparator<Item = K>,
{
    pub fn new(list: &'a SkipList<K, C, R>) -> Self {
        Cursor {
            list,
            node: null_mut(),
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.node.is_null()
    }

    /// The key under the cursor; it lives as long as the list.
    pub fn key(&self) -> Option<&'a K> {
        if self.is_valid() {
            unsafe { Some(Node::key(self.node)) }
        } else {
            None
        }
    }

    pub fn next(&mut self) {
        assert!(self.is_valid());
        self.node = unsafe { Node::next(self.node, 0) };
    }

    /// There are no back links: this searches again from the head.
    pub fn prev(&mut self) {
        assert!(self.is_valid());
        let key = unsafe { Node::key(self.node) };
        self.node = self.list.head_to_null(self.list.find_less_than(key));
    }

    /// Moves to the first key `>= target`.
    pub fn seek(&mut self, target: &K) {
        self.node = self.list.find_greater_or_equal(target, None);
    }

    pub fn seek_to_first(&mut self) {
        self.node = self.list.first();
    }

    pub fn seek_to_last(&mut self) {
        self.node = self.list.head_to_null(self.list.find_last());
    }
}

/// Keys in ascending order.
pub struct Iter<'a, K, C, R = StdRng> {
    cursor: Cursor<'a, K, C, R>,
    started: bool,
}

impl<'a, K, C, R> Iterator for Iter<'a, K, C, R>
where
    C: Comparator<Item = K>,
{
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.started {
            self.started = true;
            self.cursor.seek_to_first();
        } else if self.cursor.is_valid() {
            self.cursor.next();
        }
        self.cursor.key()
    }
}
