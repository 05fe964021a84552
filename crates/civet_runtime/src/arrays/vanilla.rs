//! The canonical array representation: an insertion-ordered map with int and
//! string keys. Removed slots become tombstones so iterator positions stay
//! stable; iteration skips them.

use std::sync::Arc;

use ahash::AHashMap;

use crate::value::{StringVal, TypedValue};

use super::{ArrayData, ArrayKey, ArrayRef, Lval, Scanner, SortFunction};

#[derive(Clone, Debug)]
struct Entry {
    key: ArrayKey,
    val: TypedValue,
}

#[derive(Clone, Debug, Default)]
pub struct VanillaStore {
    entries: Vec<Entry>,
    index: AHashMap<ArrayKey, usize>,
    next_int_key: i64,
    tombstones: usize,
}

impl VanillaStore {
    pub fn size(&self) -> usize {
        self.entries.len() - self.tombstones
    }

    /// Past-the-end iterator position.
    pub fn end_pos(&self) -> usize {
        self.entries.len()
    }

    pub fn pos_of(&self, key: &ArrayKey) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub fn get(&self, key: &ArrayKey) -> Option<&TypedValue> {
        self.pos_of(key).map(|pos| &self.entries[pos].val)
    }

    pub fn key_at(&self, pos: usize) -> Option<&ArrayKey> {
        let entry = self.entries.get(pos)?;
        if entry.val.is_uninit() {
            return None;
        }
        Some(&entry.key)
    }

    pub fn val_at(&self, pos: usize) -> Option<&TypedValue> {
        let entry = self.entries.get(pos)?;
        if entry.val.is_uninit() {
            return None;
        }
        Some(&entry.val)
    }

    pub fn first_pos(&self) -> usize {
        self.advance_from(0)
    }

    pub fn last_pos(&self) -> usize {
        let mut pos = self.entries.len();
        while pos > 0 {
            pos -= 1;
            if !self.entries[pos].val.is_uninit() {
                return pos;
            }
        }
        self.end_pos()
    }

    fn advance_from(&self, mut pos: usize) -> usize {
        while pos < self.entries.len() {
            if !self.entries[pos].val.is_uninit() {
                return pos;
            }
            pos += 1;
        }
        self.end_pos()
    }

    pub fn advance(&self, pos: usize) -> usize {
        self.advance_from(pos + 1)
    }

    pub fn rewind(&self, pos: usize) -> usize {
        let mut pos = pos;
        while pos > 0 {
            pos -= 1;
            if !self.entries[pos].val.is_uninit() {
                return pos;
            }
        }
        self.end_pos()
    }

    pub fn set(&mut self, key: ArrayKey, val: TypedValue) -> usize {
        debug_assert!(!val.is_uninit());
        if let ArrayKey::Int(i) = key {
            if i >= self.next_int_key {
                self.next_int_key = i + 1;
            }
        }
        match self.index.get(&key) {
            Some(&pos) => {
                self.entries[pos].val = val;
                pos
            }
            None => {
                let pos = self.entries.len();
                self.entries.push(Entry {
                    key: key.clone(),
                    val,
                });
                self.index.insert(key, pos);
                pos
            }
        }
    }

    pub fn append(&mut self, val: TypedValue) -> usize {
        let key = ArrayKey::Int(self.next_int_key);
        self.set(key, val)
    }

    pub fn remove(&mut self, key: &ArrayKey) -> bool {
        match self.index.remove(key) {
            Some(pos) => {
                self.entries[pos].val = TypedValue::Uninit;
                self.tombstones += 1;
                true
            }
            None => false,
        }
    }

    /// Remove and return the last live entry.
    pub fn pop(&mut self) -> TypedValue {
        let pos = self.last_pos();
        if pos == self.end_pos() {
            return TypedValue::Null;
        }
        let key = self.entries[pos].key.clone();
        let val = std::mem::replace(&mut self.entries[pos].val, TypedValue::Uninit);
        self.index.remove(&key);
        self.tombstones += 1;
        if let ArrayKey::Int(i) = key {
            if i + 1 == self.next_int_key {
                self.next_int_key = i;
            }
        }
        val
    }

    /// True when the live keys are exactly 0..n in iteration order.
    pub fn is_vector_data(&self) -> bool {
        let mut expect = 0i64;
        for entry in &self.entries {
            if entry.val.is_uninit() {
                continue;
            }
            match entry.key {
                ArrayKey::Int(i) if i == expect => expect += 1,
                _ => return false,
            }
        }
        true
    }

    pub fn heap_size(&self) -> usize {
        std::mem::size_of::<ArrayData>()
            + self.entries.capacity() * std::mem::size_of::<Entry>()
            + self.index.capacity()
                * (std::mem::size_of::<ArrayKey>() + std::mem::size_of::<usize>())
    }

    pub fn iter_live(&self) -> impl Iterator<Item = (&ArrayKey, &TypedValue)> {
        self.entries
            .iter()
            .filter(|e| !e.val.is_uninit())
            .map(|e| (&e.key, &e.val))
    }

    fn sort_by_kind(&mut self, sf: SortFunction) {
        let mut live: Vec<Entry> = self
            .entries
            .drain(..)
            .filter(|e| !e.val.is_uninit())
            .collect();
        match sf {
            SortFunction::KeySort | SortFunction::AssocSort => {
                live.sort_by(|a, b| key_order(&a.key, &b.key));
            }
            SortFunction::Sort => {
                live.sort_by(|a, b| value_order(&a.val, &b.val));
            }
        }
        self.index.clear();
        self.tombstones = 0;
        if let SortFunction::Sort = sf {
            // Plain sort renumbers keys densely.
            self.next_int_key = 0;
            let vals: Vec<TypedValue> = live.into_iter().map(|e| e.val).collect();
            for val in vals {
                self.append(val);
            }
        } else {
            for (pos, entry) in live.iter().enumerate() {
                self.index.insert(entry.key.clone(), pos);
            }
            self.entries = live;
        }
    }
}

fn key_order(a: &ArrayKey, b: &ArrayKey) -> std::cmp::Ordering {
    match (a, b) {
        (ArrayKey::Int(x), ArrayKey::Int(y)) => x.cmp(y),
        (ArrayKey::Int(_), ArrayKey::Str(_)) => std::cmp::Ordering::Less,
        (ArrayKey::Str(_), ArrayKey::Int(_)) => std::cmp::Ordering::Greater,
        (ArrayKey::Str(x), ArrayKey::Str(y)) => x.as_str().cmp(y.as_str()),
    }
}

fn value_order(a: &TypedValue, b: &TypedValue) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (TypedValue::Int(x), TypedValue::Int(y)) => x.cmp(y),
        (TypedValue::Dbl(x), TypedValue::Dbl(y)) => x.total_cmp(y),
        (TypedValue::Str(x), TypedValue::Str(y)) => x.as_str().cmp(y.as_str()),
        _ => (a.datatype().raw()).cmp(&b.datatype().raw()),
    }
    .then(Ordering::Equal)
}

//////////////////////////////////////////////////////////////////////////////
// ArrayData-level operations. Reads borrow the store; mutations copy on
// write (or reuse a uniquely-owned array for the move variants).

fn cow(ad: &ArrayRef) -> ArrayData {
    (**ad).clone()
}

fn take(ad: ArrayRef) -> ArrayData {
    Arc::try_unwrap(ad).unwrap_or_else(|shared| (*shared).clone())
}

pub fn get(ad: &ArrayData, key: &ArrayKey) -> TypedValue {
    ad.vanilla_store()
        .get(key)
        .cloned()
        .unwrap_or(TypedValue::Uninit)
}

pub fn get_int(ad: &ArrayData, k: i64) -> TypedValue {
    get(ad, &ArrayKey::Int(k))
}

pub fn get_str(ad: &ArrayData, k: &StringVal) -> TypedValue {
    get(ad, &ArrayKey::Str(k.clone()))
}

pub fn get_key(ad: &ArrayData, pos: usize) -> TypedValue {
    match ad.vanilla_store().key_at(pos) {
        Some(ArrayKey::Int(i)) => TypedValue::Int(*i),
        Some(ArrayKey::Str(s)) => TypedValue::Str(s.clone()),
        None => TypedValue::Uninit,
    }
}

pub fn get_val(ad: &ArrayData, pos: usize) -> TypedValue {
    ad.vanilla_store()
        .val_at(pos)
        .cloned()
        .unwrap_or(TypedValue::Uninit)
}

pub fn get_int_pos(ad: &ArrayData, k: i64) -> usize {
    let store = ad.vanilla_store();
    store.pos_of(&ArrayKey::Int(k)).unwrap_or(store.end_pos())
}

pub fn get_str_pos(ad: &ArrayData, k: &StringVal) -> usize {
    let store = ad.vanilla_store();
    store
        .pos_of(&ArrayKey::Str(k.clone()))
        .unwrap_or(store.end_pos())
}

pub fn set(ad: &ArrayRef, key: ArrayKey, val: TypedValue) -> ArrayRef {
    let mut out = cow(ad);
    out.vanilla_store_mut().set(key, val);
    Arc::new(out)
}

pub fn set_move(ad: ArrayRef, key: ArrayKey, val: TypedValue) -> ArrayRef {
    let mut out = take(ad);
    out.vanilla_store_mut().set(key, val);
    Arc::new(out)
}

pub fn remove(ad: &ArrayRef, key: &ArrayKey) -> ArrayRef {
    if ad.vanilla_store().pos_of(key).is_none() {
        return ad.clone();
    }
    let mut out = cow(ad);
    out.vanilla_store_mut().remove(key);
    Arc::new(out)
}

pub fn append(ad: &ArrayRef, val: TypedValue) -> ArrayRef {
    let mut out = cow(ad);
    out.vanilla_store_mut().append(val);
    Arc::new(out)
}

pub fn append_move(ad: ArrayRef, val: TypedValue) -> ArrayRef {
    let mut out = take(ad);
    out.vanilla_store_mut().append(val);
    Arc::new(out)
}

pub fn pop(ad: &ArrayRef) -> (ArrayRef, TypedValue) {
    let mut out = cow(ad);
    let val = out.vanilla_store_mut().pop();
    (Arc::new(out), val)
}

pub fn lval(ad: &ArrayRef, key: ArrayKey) -> Lval {
    let mut out = cow(ad);
    let pos = match out.vanilla_store().pos_of(&key) {
        Some(pos) => pos,
        None => out.vanilla_store_mut().set(key, TypedValue::Null),
    };
    Lval {
        arr: Arc::new(out),
        pos,
    }
}

pub fn elem(ad: &ArrayRef, key: ArrayKey, throw_on_missing: bool) -> Option<Lval> {
    match ad.vanilla_store().pos_of(&key) {
        Some(pos) => Some(Lval {
            arr: ad.clone(),
            pos,
        }),
        None if throw_on_missing => None,
        None => Some(Lval {
            arr: ad.clone(),
            pos: ad.vanilla_store().end_pos(),
        }),
    }
}

pub fn scan(ad: &ArrayData, scanner: &mut Scanner) {
    for (key, val) in ad.vanilla_store().iter_live() {
        if let ArrayKey::Str(s) = key {
            scanner.scan_str(s);
        }
        scanner.scan_value(val);
    }
}

/// Persistence-friendly copy: every string interned, nested arrays converted
/// recursively.
pub fn to_uncounted(ad: &ArrayRef) -> ArrayRef {
    let mut out = cow(ad);
    {
        // Key equality is by contents, so interning keys in place leaves the
        // index valid.
        let store = out.vanilla_store_mut();
        for entry in store.entries.iter_mut() {
            if let ArrayKey::Str(s) = &entry.key {
                entry.key = ArrayKey::Str(s.to_static());
            }
            entry.val = match std::mem::replace(&mut entry.val, TypedValue::Uninit) {
                TypedValue::Str(s) => TypedValue::Str(s.to_static()),
                TypedValue::Arr(a) => TypedValue::Arr(to_uncounted(&a)),
                other => other,
            };
        }
    }
    Arc::new(out)
}

pub fn sort(ad: &ArrayRef, sf: SortFunction) -> ArrayRef {
    let mut out = cow(ad);
    out.vanilla_store_mut().sort_by_kind(sf);
    Arc::new(out)
}

pub fn set_legacy(ad: &ArrayRef, legacy: bool) -> ArrayRef {
    if ad.is_legacy() == legacy {
        return ad.clone();
    }
    let mut out = cow(ad);
    out.legacy = legacy;
    Arc::new(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::ArrayData;

    #[test]
    fn test_set_get_append() {
        let ad = ArrayData::new_dict(vec![]);
        let ad = set(&ad, ArrayKey::Int(0), TypedValue::Int(10));
        let ad = set(&ad, ArrayKey::Str(StringVal::new_static("k")), TypedValue::Int(20));
        let ad = append(&ad, TypedValue::Int(30));

        assert_eq!(ad.size(), 3);
        assert_eq!(get_int(&ad, 0), TypedValue::Int(10));
        assert_eq!(get_str(&ad, &StringVal::new_counted("k")), TypedValue::Int(20));
        // Append allocates past the largest int key seen.
        assert_eq!(get_int(&ad, 1), TypedValue::Int(30));
    }

    #[test]
    fn test_cow_leaves_original() {
        let a = ArrayData::new_vec(vec![TypedValue::Int(1)]);
        let b = set(&a, ArrayKey::Int(0), TypedValue::Int(2));
        assert_eq!(get_int(&a, 0), TypedValue::Int(1));
        assert_eq!(get_int(&b, 0), TypedValue::Int(2));
    }

    #[test]
    fn test_iteration_skips_tombstones() {
        let ad = ArrayData::new_vec(vec![
            TypedValue::Int(1),
            TypedValue::Int(2),
            TypedValue::Int(3),
        ]);
        let ad = remove(&ad, &ArrayKey::Int(1));

        let store = ad.vanilla_store();
        let mut seen = Vec::new();
        let mut pos = store.first_pos();
        while pos != store.end_pos() {
            seen.push(get_val(&ad, pos));
            pos = store.advance(pos);
        }
        assert_eq!(seen, vec![TypedValue::Int(1), TypedValue::Int(3)]);
        assert_eq!(store.last_pos(), 2);
        assert!(!store.is_vector_data());
    }

    #[test]
    fn test_pop() {
        let ad = ArrayData::new_vec(vec![TypedValue::Int(1), TypedValue::Int(2)]);
        let (ad, val) = pop(&ad);
        assert_eq!(val, TypedValue::Int(2));
        assert_eq!(ad.size(), 1);
        // The freed key is reused by the next append.
        let ad = append(&ad, TypedValue::Int(9));
        assert_eq!(get_int(&ad, 1), TypedValue::Int(9));
    }

    #[test]
    fn test_keyset_keys_are_their_own_values() {
        let ad = ArrayData::new_keyset(vec![
            ArrayKey::Int(3),
            ArrayKey::Str(StringVal::new_static("k")),
        ]);
        assert_eq!(get_int(&ad, 3), TypedValue::Int(3));
        assert_eq!(
            get_str(&ad, &StringVal::new_static("k")),
            TypedValue::static_str("k")
        );
    }

    #[test]
    fn test_lval_and_elem() {
        let ad = ArrayData::new_dict(vec![(ArrayKey::Int(0), TypedValue::Int(1))]);

        let lv = lval(&ad, ArrayKey::Int(0));
        assert_eq!(get_val(&lv.arr, lv.pos), TypedValue::Int(1));

        // A missing lval key materializes a null slot.
        let lv = lval(&ad, ArrayKey::Int(9));
        assert_eq!(get_val(&lv.arr, lv.pos), TypedValue::Null);

        let el = elem(&ad, ArrayKey::Int(0), true).unwrap();
        assert_eq!(el.pos, 0);
        assert!(elem(&ad, ArrayKey::Int(9), true).is_none());
        // Missing without throw lands on the null base past the end.
        let el = elem(&ad, ArrayKey::Int(9), false).unwrap();
        assert_eq!(el.pos, ad.vanilla_store().end_pos());
    }

    #[test]
    fn test_scan_collects_counted_values() {
        let nested = ArrayData::new_vec(vec![]);
        let ad = ArrayData::new_dict(vec![
            (ArrayKey::Int(0), TypedValue::counted_str("heap")),
            (ArrayKey::Int(1), TypedValue::static_str("static")),
            (ArrayKey::Int(2), TypedValue::Arr(nested)),
        ]);

        let mut scanner = Scanner::new();
        scan(&ad, &mut scanner);
        // The counted string and the nested array, not the static string.
        assert_eq!(scanner.counted().len(), 2);
    }

    #[test]
    fn test_to_uncounted_interns() {
        let ad = ArrayData::new_dict(vec![(
            ArrayKey::Str(StringVal::new_counted("name")),
            TypedValue::counted_str("value"),
        )]);
        let unc = to_uncounted(&ad);
        match get_str(&unc, &StringVal::new_static("name")) {
            TypedValue::Str(s) => assert!(s.is_static()),
            other => panic!("expected string, got {other:?}"),
        }
    }

    #[test]
    fn test_sort_renumbers() {
        let ad = ArrayData::new_vec(vec![
            TypedValue::Int(3),
            TypedValue::Int(1),
            TypedValue::Int(2),
        ]);
        let sorted = sort(&ad, SortFunction::Sort);
        assert_eq!(get_int(&sorted, 0), TypedValue::Int(1));
        assert_eq!(get_int(&sorted, 2), TypedValue::Int(3));
        assert!(sorted.vanilla_store().is_vector_data());
    }
}
