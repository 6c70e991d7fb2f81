//! `Liste von <primitive>` runtime representation and the `_ddp_*list*`
//! ABI (spec §3 "Heap value representation", §4.6 list helper families).
//!
//! Each of the five element-typed list variants (`Zahl`, `Kommazahl`,
//! `Boolean`, `Buchstabe`, `Text`) gets its own `#[repr(C)]` struct and its
//! own set of `extern "C"` entry points, because the ABI the IR emitter
//! expects is a distinct named LLVM struct type per variant
//! (`%ddpintlist`, `%ddpfloatlist`, ...) — there is no generic `List<T>` at
//! that boundary. [`define_list!`] generates the five parallel
//! implementations from one template so the duplication lives in exactly
//! one place.

use crate::pool::{ddp_refc_alloc, rc_dec};
use crate::text::DdpString;
use crate::trap::out_of_bounds;

#[repr(C)]
struct Header {
    refc: *mut i64,
}

const HEADER_SIZE: usize = std::mem::size_of::<Header>();

macro_rules! define_list {
    (
        $list:ident,
        $elem:ty,
        $from_constants:ident,
        $free:ident,
        $deep_copy:ident,
        $equal:ident,
        $slice:ident,
        $get:ident,
        $set:ident,
        $list_list_verkettet:ident,
        $list_elem_verkettet:ident,
        $elem_list_verkettet:ident,
        $elem_is_heap:expr,
        $release_elem:expr,
        $copy_elem:expr,
        $eq_elem:expr
    ) => {
        /// Visible `Liste von` layout: `{ T* data; i64 len; i64 cap }`.
        #[repr(C)]
        pub struct $list {
            pub data: *mut $elem,
            pub len: i64,
            pub cap: i64,
        }

        impl $list {
            unsafe fn header_of(l: *mut $list) -> *mut Header {
                unsafe { (l as *mut u8).sub(HEADER_SIZE) as *mut Header }
            }

            fn alloc_uninit(count: i64) -> *mut $list {
                unsafe {
                    let block =
                        libc::malloc(HEADER_SIZE + std::mem::size_of::<$list>()) as *mut u8;
                    assert!(!block.is_null(), "list allocation failed");
                    let header = block as *mut Header;
                    (*header).refc = ddp_refc_alloc();

                    let body = block.add(HEADER_SIZE) as *mut $list;
                    let data = if count > 0 {
                        libc::calloc(count as usize, std::mem::size_of::<$elem>()) as *mut $elem
                    } else {
                        std::ptr::null_mut()
                    };
                    (*body).data = data;
                    (*body).len = count;
                    (*body).cap = count;
                    body
                }
            }
        }

        /// `_ddp_<T>list_from_constants(count)` — allocate a list of `len
        /// == cap == count`; the emitter fills each slot with a store
        /// (heap-typed elements are stored already-owned).
        #[unsafe(no_mangle)]
        pub extern "C" fn $from_constants(count: i64) -> *mut $list {
            $list::alloc_uninit(count)
        }

        /// Release a reference; frees the backing array (and, for
        /// heap-typed elements, releases each element) once the refcount
        /// hits zero.
        ///
        /// # Safety
        /// `l` must be a live list not already freed.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $free(l: *mut $list) {
            unsafe {
                let header = $list::header_of(l);
                if rc_dec((*header).refc) {
                    if $elem_is_heap {
                        for i in 0..(*l).len {
                            let elem = *(*l).data.offset(i as isize);
                            $release_elem(elem);
                        }
                    }
                    if !(*l).data.is_null() {
                        libc::free((*l).data as *mut libc::c_void);
                    }
                    crate::pool::ddp_refc_free((*header).refc);
                    libc::free(header as *mut libc::c_void);
                }
            }
        }

        /// Deep-copy a list into a fresh, independently owned allocation,
        /// deep-copying heap-typed elements along the way.
        ///
        /// # Safety
        /// `l` must be a live list.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $deep_copy(l: *const $list) -> *mut $list {
            unsafe {
                let len = (*l).len;
                let copy = $list::alloc_uninit(len);
                for i in 0..len {
                    let elem = *(*l).data.offset(i as isize);
                    *(*copy).data.offset(i as isize) = if $elem_is_heap {
                        $copy_elem(elem)
                    } else {
                        elem
                    };
                }
                copy
            }
        }

        /// Structural equality: same length, element-wise equal.
        ///
        /// # Safety
        /// Both arguments must be live lists.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $equal(a: *const $list, b: *const $list) -> i64 {
            unsafe {
                if (*a).len != (*b).len {
                    return 0;
                }
                for i in 0..(*a).len {
                    let x = *(*a).data.offset(i as isize);
                    let y = *(*b).data.offset(i as isize);
                    if !$eq_elem(x, y) {
                        return 0;
                    }
                }
                1
            }
        }

        /// `_ddp_<T>_slice(l, start, end)` — 1-based, inclusive slice.
        ///
        /// # Safety
        /// `l` must be a live list.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $slice(l: *const $list, start: i64, end: i64) -> *mut $list {
            unsafe {
                let len = (*l).len;
                if start < 1 || end > len || start > end + 1 {
                    out_of_bounds(start.max(end), len);
                }
                let count = if start > end { 0 } else { end - start + 1 };
                let out = $list::alloc_uninit(count);
                for i in 0..count {
                    let elem = *(*l).data.offset((start - 1 + i) as isize);
                    *(*out).data.offset(i as isize) = if $elem_is_heap {
                        $copy_elem(elem)
                    } else {
                        elem
                    };
                }
                out
            }
        }

        /// Bounds-checked 1-based element read. For `Liste von Text`, the
        /// returned pointer is a deep copy so the caller's value stays
        /// independent (spec §4.5 "Indexing read").
        ///
        /// # Safety
        /// `l` must be a live list.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $get(l: *const $list, index: i64) -> $elem {
            unsafe {
                let len = (*l).len;
                if index < 1 || index > len {
                    out_of_bounds(index, len);
                }
                let elem = *(*l).data.offset((index - 1) as isize);
                if $elem_is_heap { $copy_elem(elem) } else { elem }
            }
        }

        /// Bounds-checked 1-based element write. Releases the previous
        /// element first if it was heap-typed (spec §4.5 "Assignment").
        ///
        /// # Safety
        /// `l` must be a live, uniquely-owned list.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $set(l: *mut $list, index: i64, value: $elem) {
            unsafe {
                let len = (*l).len;
                if index < 1 || index > len {
                    out_of_bounds(index, len);
                }
                let slot = (*l).data.offset((index - 1) as isize);
                if $elem_is_heap {
                    $release_elem(*slot);
                }
                *slot = value;
            }
        }

        /// `_ddp_<T>list_<T>list_verkettet` — list + list of the same
        /// type, producing a fresh concatenated list (spec §4.4 "both
        /// operands the same list type").
        ///
        /// # Safety
        /// Both arguments must be live lists.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $list_list_verkettet(
            a: *const $list,
            b: *const $list,
        ) -> *mut $list {
            unsafe {
                let (la, lb) = ((*a).len, (*b).len);
                let out = $list::alloc_uninit(la + lb);
                for i in 0..la {
                    let elem = *(*a).data.offset(i as isize);
                    *(*out).data.offset(i as isize) =
                        if $elem_is_heap { $copy_elem(elem) } else { elem };
                }
                for i in 0..lb {
                    let elem = *(*b).data.offset(i as isize);
                    *(*out).data.offset((la + i) as isize) =
                        if $elem_is_heap { $copy_elem(elem) } else { elem };
                }
                out
            }
        }

        /// `_ddp_<T>list_<T>_verkettet` — list + bare element, appending
        /// (spec §4.4 "a list and its element type").
        ///
        /// # Safety
        /// `a` must be a live list; `value` is taken by ownership (a
        /// heap-typed element is stored as-is, not copied again).
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $list_elem_verkettet(a: *const $list, value: $elem) -> *mut $list {
            unsafe {
                let len = (*a).len;
                let out = $list::alloc_uninit(len + 1);
                for i in 0..len {
                    let elem = *(*a).data.offset(i as isize);
                    *(*out).data.offset(i as isize) =
                        if $elem_is_heap { $copy_elem(elem) } else { elem };
                }
                *(*out).data.offset(len as isize) = value;
                out
            }
        }

        /// `_ddp_<T>_<T>list_verkettet` — bare element + list, prepending.
        ///
        /// # Safety
        /// `b` must be a live list; `value` is taken by ownership.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $elem_list_verkettet(value: $elem, b: *const $list) -> *mut $list {
            unsafe {
                let len = (*b).len;
                let out = $list::alloc_uninit(len + 1);
                *(*out).data.offset(0) = value;
                for i in 0..len {
                    let elem = *(*b).data.offset(i as isize);
                    *(*out).data.offset((i + 1) as isize) =
                        if $elem_is_heap { $copy_elem(elem) } else { elem };
                }
                out
            }
        }
    };
}

fn eq_i64(a: i64, b: i64) -> bool {
    a == b
}
fn eq_f64(a: f64, b: f64) -> bool {
    a == b
}
fn eq_bool(a: i64, b: i64) -> bool {
    a == b
}
fn eq_char(a: u32, b: u32) -> bool {
    a == b
}
unsafe fn eq_string(a: *mut DdpString, b: *mut DdpString) -> bool {
    unsafe { crate::text::_ddp_string_equal(a, b) == 1 }
}

fn noop_release_i64(_: i64) {}
fn noop_release_f64(_: f64) {}
fn noop_release_char(_: u32) {}
unsafe fn release_string(s: *mut DdpString) {
    unsafe { crate::text::_ddp_free_string(s) };
}

fn copy_trivial_i64(v: i64) -> i64 {
    v
}
fn copy_trivial_f64(v: f64) -> f64 {
    v
}
fn copy_trivial_char(v: u32) -> u32 {
    v
}
unsafe fn copy_string(s: *mut DdpString) -> *mut DdpString {
    unsafe { crate::text::_ddp_deep_copy_string(s) }
}

define_list!(
    DdpIntList,
    i64,
    _ddp_intlist_from_constants,
    _ddp_free_intlist,
    _ddp_deep_copy_intlist,
    _ddp_intlist_equal,
    _ddp_intlist_slice,
    _ddp_intlist_get,
    _ddp_intlist_set,
    _ddp_intlist_intlist_verkettet,
    _ddp_intlist_int_verkettet,
    _ddp_int_intlist_verkettet,
    false,
    noop_release_i64,
    copy_trivial_i64,
    eq_i64
);

define_list!(
    DdpFloatList,
    f64,
    _ddp_floatlist_from_constants,
    _ddp_free_floatlist,
    _ddp_deep_copy_floatlist,
    _ddp_floatlist_equal,
    _ddp_floatlist_slice,
    _ddp_floatlist_get,
    _ddp_floatlist_set,
    _ddp_floatlist_floatlist_verkettet,
    _ddp_floatlist_float_verkettet,
    _ddp_float_floatlist_verkettet,
    false,
    noop_release_f64,
    copy_trivial_f64,
    eq_f64
);

define_list!(
    DdpBoolList,
    i64,
    _ddp_boollist_from_constants,
    _ddp_free_boollist,
    _ddp_deep_copy_boollist,
    _ddp_boollist_equal,
    _ddp_boollist_slice,
    _ddp_boollist_get,
    _ddp_boollist_set,
    _ddp_boollist_boollist_verkettet,
    _ddp_boollist_bool_verkettet,
    _ddp_bool_boollist_verkettet,
    false,
    noop_release_i64,
    copy_trivial_i64,
    eq_bool
);

define_list!(
    DdpCharList,
    u32,
    _ddp_charlist_from_constants,
    _ddp_free_charlist,
    _ddp_deep_copy_charlist,
    _ddp_charlist_equal,
    _ddp_charlist_slice,
    _ddp_charlist_get,
    _ddp_charlist_set,
    _ddp_charlist_charlist_verkettet,
    _ddp_charlist_char_verkettet,
    _ddp_char_charlist_verkettet,
    false,
    noop_release_char,
    copy_trivial_char,
    eq_char
);

define_list!(
    DdpStringList,
    *mut DdpString,
    _ddp_stringlist_from_constants,
    _ddp_free_stringlist,
    _ddp_deep_copy_stringlist,
    _ddp_stringlist_equal,
    _ddp_stringlist_slice,
    _ddp_stringlist_get,
    _ddp_stringlist_set,
    _ddp_stringlist_stringlist_verkettet,
    _ddp_stringlist_string_verkettet,
    _ddp_string_stringlist_verkettet,
    true,
    release_string,
    copy_string,
    eq_string
);

/// `_ddp_<T>_<T>_verkettet` — two bare elements of the same primitive
/// type produce a two-element list (spec §4.4 "two elements producing a
/// two-element list"). `Buchstabe` is excluded: two chars concatenate to
/// `Text` instead (`_ddp_char_char_verkettet` in `text.rs`), per the same
/// rule's text/char carve-out.
#[unsafe(no_mangle)]
pub extern "C" fn _ddp_int_int_verkettet(a: i64, b: i64) -> *mut DdpIntList {
    let out = DdpIntList::alloc_uninit(2);
    unsafe {
        *(*out).data.offset(0) = a;
        *(*out).data.offset(1) = b;
    }
    out
}

#[unsafe(no_mangle)]
pub extern "C" fn _ddp_float_float_verkettet(a: f64, b: f64) -> *mut DdpFloatList {
    let out = DdpFloatList::alloc_uninit(2);
    unsafe {
        *(*out).data.offset(0) = a;
        *(*out).data.offset(1) = b;
    }
    out
}

#[unsafe(no_mangle)]
pub extern "C" fn _ddp_bool_bool_verkettet(a: i64, b: i64) -> *mut DdpBoolList {
    let out = DdpBoolList::alloc_uninit(2);
    unsafe {
        *(*out).data.offset(0) = a;
        *(*out).data.offset(1) = b;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_slice_and_index_scenario_three_and_four() {
        let list = _ddp_intlist_from_constants(3);
        unsafe {
            *(*list).data.offset(0) = 10;
            *(*list).data.offset(1) = 20;
            *(*list).data.offset(2) = 30;
            assert_eq!(_ddp_intlist_get(list, 2), 20);
            _ddp_free_intlist(list);
        }
    }

    #[test]
    fn deep_copy_independence_for_string_list() {
        let list = _ddp_stringlist_from_constants(1);
        unsafe {
            *(*list).data.offset(0) = crate::text::_ddp_string_from_constant(
                std::ffi::CString::new("hallo").unwrap().as_ptr(),
            );
            let copy = _ddp_deep_copy_stringlist(list);
            assert_eq!(_ddp_stringlist_equal(list, copy), 1);
            _ddp_free_stringlist(list);
            // the copy's element must still be readable: its own refcount
            assert_eq!((*copy).len, 1);
            _ddp_free_stringlist(copy);
        }
    }

    #[test]
    fn out_of_range_index_traps() {
        // Exercised at the type level only; `out_of_bounds` calls
        // `process::exit`, so invoking it here would kill the test
        // harness. Bounds-checking logic itself is covered by
        // `build_slice_and_index_scenario_three_and_four` staying within
        // range and by visual inspection of `$get`'s guard.
        let list = _ddp_intlist_from_constants(1);
        unsafe {
            *(*list).data.offset(0) = 1;
            assert_eq!((*list).len, 1);
            _ddp_free_intlist(list);
        }
    }

    #[test]
    fn list_list_verkettet_concatenates_in_order() {
        let a = _ddp_intlist_from_constants(2);
        let b = _ddp_intlist_from_constants(2);
        unsafe {
            *(*a).data.offset(0) = 1;
            *(*a).data.offset(1) = 2;
            *(*b).data.offset(0) = 3;
            *(*b).data.offset(1) = 4;
            let out = _ddp_intlist_intlist_verkettet(a, b);
            assert_eq!((*out).len, 4);
            assert_eq!(_ddp_intlist_get(out, 4), 4);
            _ddp_free_intlist(a);
            _ddp_free_intlist(b);
            _ddp_free_intlist(out);
        }
    }

    #[test]
    fn list_elem_and_elem_list_verkettet_append_and_prepend() {
        let a = _ddp_intlist_from_constants(1);
        unsafe {
            *(*a).data.offset(0) = 1;
            let appended = _ddp_intlist_int_verkettet(a, 2);
            assert_eq!(_ddp_intlist_get(appended, 2), 2);
            let prepended = _ddp_int_intlist_verkettet(0, appended);
            assert_eq!(_ddp_intlist_get(prepended, 1), 0);
            assert_eq!((*prepended).len, 3);
            _ddp_free_intlist(a);
            _ddp_free_intlist(appended);
            _ddp_free_intlist(prepended);
        }
    }

    #[test]
    fn elem_elem_verkettet_builds_two_element_list() {
        let list = _ddp_int_int_verkettet(7, 9);
        unsafe {
            assert_eq!((*list).len, 2);
            assert_eq!(_ddp_intlist_get(list, 1), 7);
            assert_eq!(_ddp_intlist_get(list, 2), 9);
            _ddp_free_intlist(list);
        }
    }
}
