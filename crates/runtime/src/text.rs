//! `Text` runtime representation and the `_ddp_*string*` ABI (spec §3
//! "Heap value representation", §4.6 string helper family).
//!
//! `ddpstring` is a pointer to `{char* bytes; i64 cap}`, null-terminated,
//! UTF-8, `cap` counting the terminator byte. That's the layout the IR
//! emitter sees and GEPs into directly. The refcount cell is *not* part of
//! that visible layout — it lives in a small header malloc'd immediately
//! before the visible struct, and `header_of`/`DdpString::alloc` are the
//! only places that know about it.

use crate::pool::{ddp_refc_alloc, rc_dec, rc_inc};
use std::ffi::CStr;
use std::os::raw::c_char;

#[repr(C)]
struct Header {
    refc: *mut i64,
}

/// The visible `ddpstring` struct — exactly the layout spec §3 describes.
/// The pointer the emitted IR holds always points here, never at the
/// header.
#[repr(C)]
pub struct DdpString {
    pub bytes: *mut u8,
    pub cap: i64,
}

const HEADER_SIZE: usize = std::mem::size_of::<Header>();

unsafe fn header_of(s: *mut DdpString) -> *mut Header {
    unsafe { (s as *mut u8).sub(HEADER_SIZE) as *mut Header }
}

/// Allocate a fresh `ddpstring` whose bytes are `content` plus a NUL
/// terminator, with a new refcount cell (count = 1).
fn alloc_from_bytes(content: &[u8]) -> *mut DdpString {
    let cap = content.len() as i64 + 1;
    unsafe {
        let block = libc::malloc(HEADER_SIZE + std::mem::size_of::<DdpString>()) as *mut u8;
        assert!(!block.is_null(), "ddp string allocation failed");
        let header = block as *mut Header;
        (*header).refc = ddp_refc_alloc();

        let body = block.add(HEADER_SIZE) as *mut DdpString;
        let bytes = libc::malloc(cap as usize) as *mut u8;
        assert!(!bytes.is_null(), "ddp string byte buffer allocation failed");
        std::ptr::copy_nonoverlapping(content.as_ptr(), bytes, content.len());
        *bytes.add(content.len()) = 0;
        (*body).bytes = bytes;
        (*body).cap = cap;
        body
    }
}

pub(crate) fn as_str<'a>(s: *const DdpString) -> &'a str {
    unsafe {
        let cap = (*s).cap;
        debug_assert!(cap >= 1);
        let len = (cap - 1) as usize;
        let slice = std::slice::from_raw_parts((*s).bytes, len);
        std::str::from_utf8(slice).expect("ddpstring bytes are not valid UTF-8")
    }
}

/// Build a `ddpstring` from a compiler-emitted constant C string global.
///
/// # Safety
/// `c_str` must be a valid NUL-terminated, UTF-8 C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn _ddp_string_from_constant(c_str: *const c_char) -> *mut DdpString {
    let bytes = unsafe { CStr::from_ptr(c_str) }.to_bytes();
    alloc_from_bytes(bytes)
}

/// Deep-copy a `ddpstring` into a fresh, independently-owned allocation.
///
/// # Safety
/// `s` must be a live `ddpstring`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn _ddp_deep_copy_string(s: *const DdpString) -> *mut DdpString {
    alloc_from_bytes(as_str(s).as_bytes())
}

/// Release a reference to `s`, freeing its storage once the refcount hits
/// zero. The emitter never calls this on null.
///
/// # Safety
/// `s` must be a live `ddpstring` not already freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn _ddp_free_string(s: *mut DdpString) {
    unsafe {
        let header = header_of(s);
        if rc_dec((*header).refc) {
            ddp_refc_free_string_cell(header);
            libc::free((*s).bytes as *mut libc::c_void);
            libc::free(header as *mut libc::c_void);
        }
    }
}

unsafe fn ddp_refc_free_string_cell(header: *mut Header) {
    unsafe {
        crate::pool::ddp_refc_free((*header).refc);
    }
}

/// Share (not deep-copy) a reference to `s`, used when a reference
/// parameter's storage slot is bound without transferring ownership.
///
/// # Safety
/// `s` must be a live `ddpstring`.
pub unsafe fn ddp_string_share(s: *mut DdpString) -> *mut DdpString {
    unsafe {
        rc_inc((*header_of(s)).refc);
    }
    s
}

/// `_ddp_string_equal(a, b) -> bool` (as i64 0/1, matching the emitter's
/// `Boolean` representation).
///
/// # Safety
/// Both arguments must be live `ddpstring`s.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn _ddp_string_equal(a: *const DdpString, b: *const DdpString) -> i64 {
    (as_str(a) == as_str(b)) as i64
}

/// `_ddp_string_length` — number of Unicode scalar values, not bytes.
///
/// # Safety
/// `s` must be a live `ddpstring`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn _ddp_string_length(s: *const DdpString) -> i64 {
    as_str(s).chars().count() as i64
}

/// `_ddp_string_index(s, index)` — 1-based `Zahl` index to a `Buchstabe`.
/// Traps via `out_of_bounds` if out of range.
///
/// # Safety
/// `s` must be a live `ddpstring`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn _ddp_string_index(s: *const DdpString, index: i64) -> u32 {
    let text = as_str(s);
    let len = text.chars().count() as i64;
    if index < 1 || index > len {
        crate::trap::out_of_bounds(index, len);
    }
    text.chars().nth((index - 1) as usize).unwrap() as u32
}

/// `_ddp_string_slice(s, start, end)` — 1-based, inclusive `von start bis
/// end` slice. Traps on an invalid range.
///
/// # Safety
/// `s` must be a live `ddpstring`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn _ddp_string_slice(
    s: *const DdpString,
    start: i64,
    end: i64,
) -> *mut DdpString {
    let text = as_str(s);
    let len = text.chars().count() as i64;
    if start < 1 || end > len || start > end + 1 {
        crate::trap::out_of_bounds(start.max(end), len);
    }
    if start > end {
        return alloc_from_bytes(b"");
    }
    let sliced: String = text
        .chars()
        .skip((start - 1) as usize)
        .take((end - start + 1) as usize)
        .collect();
    alloc_from_bytes(sliced.as_bytes())
}

/// `_ddp_replace_char_in_string(s, index, ch)` — in-place replacement of
/// the `index`-th scalar value. Because UTF-8 is variable width, the new
/// character may change the byte length; this reallocates the backing
/// buffer rather than mutating it in place.
///
/// # Safety
/// `s` must be a live, uniquely-owned `ddpstring` (the type checker
/// forbids binding a char-typed reference parameter to a character inside
/// a text for exactly this reason — see spec §4.4).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn _ddp_replace_char_in_string(s: *mut DdpString, index: i64, ch: u32) {
    let text = as_str(s);
    let len = text.chars().count() as i64;
    if index < 1 || index > len {
        crate::trap::out_of_bounds(index, len);
    }
    let replacement = char::from_u32(ch).expect("ddp_replace_char_in_string: invalid scalar value");
    let mut rebuilt = String::with_capacity(text.len());
    for (i, c) in text.chars().enumerate() {
        if i as i64 == index - 1 {
            rebuilt.push(replacement);
        } else {
            rebuilt.push(c);
        }
    }
    unsafe {
        libc::free((*s).bytes as *mut libc::c_void);
        let cap = rebuilt.len() as i64 + 1;
        let bytes = libc::malloc(cap as usize) as *mut u8;
        assert!(!bytes.is_null());
        std::ptr::copy_nonoverlapping(rebuilt.as_ptr(), bytes, rebuilt.len());
        *bytes.add(rebuilt.len()) = 0;
        (*s).bytes = bytes;
        (*s).cap = cap;
    }
}

/// `_ddp_string_to_int` — parses the full string as a `Zahl`. Returns 0 on
/// malformed input and sets no error channel: no panics cross the FFI
/// boundary.
///
/// # Safety
/// `s` must be a live `ddpstring`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn _ddp_string_to_int(s: *const DdpString) -> i64 {
    as_str(s).trim().parse::<i64>().unwrap_or(0)
}

/// `_ddp_string_to_float`.
///
/// # Safety
/// `s` must be a live `ddpstring`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn _ddp_string_to_float(s: *const DdpString) -> f64 {
    as_str(s).trim().replace(',', ".").parse::<f64>().unwrap_or(0.0)
}

/// `_ddp_int_to_string`.
#[unsafe(no_mangle)]
pub extern "C" fn _ddp_int_to_string(value: i64) -> *mut DdpString {
    alloc_from_bytes(value.to_string().as_bytes())
}

/// `_ddp_float_to_string` — uses `,` as the decimal separator, matching
/// the scanner's own number literal convention (spec §4.1 "Numbers").
#[unsafe(no_mangle)]
pub extern "C" fn _ddp_float_to_string(value: f64) -> *mut DdpString {
    alloc_from_bytes(value.to_string().replace('.', ",").as_bytes())
}

/// `_ddp_bool_to_string` — `"wahr"` / `"falsch"`.
#[unsafe(no_mangle)]
pub extern "C" fn _ddp_bool_to_string(value: i64) -> *mut DdpString {
    alloc_from_bytes(if value != 0 { b"wahr" } else { b"falsch" })
}

/// `_ddp_char_to_string`.
#[unsafe(no_mangle)]
pub extern "C" fn _ddp_char_to_string(value: u32) -> *mut DdpString {
    let c = char::from_u32(value).unwrap_or('\u{FFFD}');
    let mut buf = [0u8; 4];
    alloc_from_bytes(c.encode_utf8(&mut buf).as_bytes())
}

/// `_ddp_string_string_verkettet` — text + text concatenation.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn _ddp_string_string_verkettet(
    a: *const DdpString,
    b: *const DdpString,
) -> *mut DdpString {
    let mut combined = String::with_capacity(as_str(a).len() + as_str(b).len());
    combined.push_str(as_str(a));
    combined.push_str(as_str(b));
    alloc_from_bytes(combined.as_bytes())
}

/// `_ddp_string_char_verkettet` — text + char.
///
/// # Safety
/// `a` must be a live `ddpstring`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn _ddp_string_char_verkettet(a: *const DdpString, b: u32) -> *mut DdpString {
    let mut combined = String::from(as_str(a));
    combined.push(char::from_u32(b).expect("invalid scalar value"));
    alloc_from_bytes(combined.as_bytes())
}

/// `_ddp_char_string_verkettet` — char + text.
///
/// # Safety
/// `b` must be a live `ddpstring`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn _ddp_char_string_verkettet(a: u32, b: *const DdpString) -> *mut DdpString {
    let mut combined = String::new();
    combined.push(char::from_u32(a).expect("invalid scalar value"));
    combined.push_str(as_str(b));
    alloc_from_bytes(combined.as_bytes())
}

/// `_ddp_char_char_verkettet` — two chars produce a two-scalar text.
#[unsafe(no_mangle)]
pub extern "C" fn _ddp_char_char_verkettet(a: u32, b: u32) -> *mut DdpString {
    let mut combined = String::new();
    combined.push(char::from_u32(a).expect("invalid scalar value"));
    combined.push(char::from_u32(b).expect("invalid scalar value"));
    alloc_from_bytes(combined.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make(s: &str) -> *mut DdpString {
        alloc_from_bytes(s.as_bytes())
    }

    #[test]
    fn round_trip_and_cap_terminator() {
        let s = make("Hallo, Welt!");
        unsafe {
            assert_eq!(as_str(s), "Hallo, Welt!");
            assert_eq!(*(*s).bytes.add(((*s).cap - 1) as usize), 0);
            _ddp_free_string(s);
        }
    }

    #[test]
    fn deep_copy_is_independent() {
        let s = make("abcdef");
        unsafe {
            let copy = _ddp_deep_copy_string(s);
            assert_eq!(_ddp_string_equal(s, copy), 1);
            _ddp_free_string(s);
            // copy survives independently
            assert_eq!(as_str(copy), "abcdef");
            _ddp_free_string(copy);
        }
    }

    #[test]
    fn slice_identity_over_full_range() {
        let s = make("abcdef");
        unsafe {
            let len = _ddp_string_length(s);
            let sliced = _ddp_string_slice(s, 1, len);
            assert_eq!(as_str(sliced), "abcdef");
            _ddp_free_string(s);
            _ddp_free_string(sliced);
        }
    }

    #[test]
    fn slice_middle_matches_scenario_four() {
        let s = make("abcdef");
        unsafe {
            let sliced = _ddp_string_slice(s, 2, 4);
            assert_eq!(as_str(sliced), "bcd");
            _ddp_free_string(s);
            _ddp_free_string(sliced);
        }
    }

    #[test]
    fn concat_associativity() {
        let a = make("a");
        let b = make("b");
        let c = make("c");
        unsafe {
            let ab = _ddp_string_string_verkettet(a, b);
            let ab_c = _ddp_string_string_verkettet(ab, c);
            let bc = _ddp_string_string_verkettet(b, c);
            let a_bc = _ddp_string_string_verkettet(a, bc);
            assert_eq!(as_str(ab_c), as_str(a_bc));
            for p in [a, b, c, ab, ab_c, bc, a_bc] {
                _ddp_free_string(p);
            }
        }
    }

    #[test]
    fn int_to_string_and_back_round_trips() {
        let n = 424242i64;
        let s = _ddp_int_to_string(n);
        unsafe {
            assert_eq!(_ddp_string_to_int(s), n);
            _ddp_free_string(s);
        }
    }

    #[test]
    fn unicode_index_counts_scalars_not_bytes() {
        let s = make("äöü");
        unsafe {
            assert_eq!(_ddp_string_length(s), 3);
            assert_eq!(_ddp_string_index(s, 2), 'ö' as u32);
            _ddp_free_string(s);
        }
    }
}
