/*
Copyright (c) 2022 VMware, Inc.
SPDX-License-Identifier: MIT
Permission is hereby granted, free of charge, to any person obtaining a copy
of this software and associated documentation files (the "Software"), to deal
in the Software without restriction, including without limitation the rights
to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
copies of the Software, and to permit persons to whom the Software is
furnished to do so, subject to the following conditions:
The above copyright notice and this permission notice shall be included in all
copies or substantial portions of the Software.
THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
SOFTWARE.
 */

// Derived from lib/command-line.c in Open vSwitch, with the following license:
/*
 * Copyright (c) 2008, 2009, 2010, 2011, 2013, 2014 Nicira, Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at:
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Controls the name of the running process, as shown by `ps`.
//!
//! The guardian and daemon processes advertise themselves as
//! `ubic-guardian <name>` and `ubic-daemon <name>`; operators and external
//! tooling grep process listings for these, so [`set`] writes the given
//! title verbatim.
//!
//! This is operating-system specific functionality, currently implemented
//! for GNU/Linux only.  Elsewhere it is a no-op.

#[cfg(all(target_os = "linux", target_env = "gnu"))]
mod linux {
    use std::ffi::CStr;
    use std::os::raw::c_int;
    use std::ptr::null_mut;
    use std::sync::Mutex;

    /// The memory that held `argv` when the process started, reusable as a
    /// title buffer once the original strings have been copied elsewhere.
    struct ArgvRegion {
        data: &'static mut [u8],
    }

    impl ArgvRegion {
        fn set(&mut self, title: &str) {
            let mut title = title.to_owned();
            if title.len() >= self.data.len() {
                title.truncate(self.data.len() - 4);
                title.push_str("...");
            }

            let mut bytes = Vec::with_capacity(self.data.len());
            bytes.extend(title.as_bytes());
            bytes.resize(self.data.len() - 1, 0);
            bytes.push(0);
            self.data.copy_from_slice(&bytes);
        }

        /// The name shown by `ps` and friends is whatever `argv[0]` points
        /// at.  Clone every `argv` string to fresh heap allocations, repoint
        /// `argv[*]` at the clones, and claim the contiguous original region
        /// as scratch space for titles.
        ///
        /// Returns `None` when there is no usable region (empty `argv`, or
        /// fewer than four reclaimable bytes).
        unsafe fn new(argc: c_int, argv: *mut *mut u8) -> Option<Self> {
            if argc == 0 || *argv == null_mut() {
                return None;
            }

            let argv0 = cstr_mut_slice_with_nul_from_ptr(*argv);
            let mut region = argv0.as_mut_ptr_range();
            *argv = cstr_clone(argv0);
            for i in 1..argc as isize {
                let argvip = argv.offset(i);
                let argvi = cstr_mut_slice_with_nul_from_ptr(*argvip);
                *argvip = cstr_clone(argvi);

                // Linux places argv[0] lowest and the rest at increasing
                // addresses; grow the region while the strings stay
                // contiguous.
                let argvi = argvi.as_mut_ptr_range();
                if argvi.start == region.end {
                    region = region.start..argvi.end;
                }
            }
            let len = region.end.offset_from(region.start) as usize;
            if len < 4 {
                return None;
            }
            let data = std::slice::from_raw_parts_mut(region.start, len);
            Some(ArgvRegion { data })
        }
    }

    static TITLE: Mutex<Option<ArgvRegion>> = Mutex::new(None);

    /// Returns the length of the null-terminated string at `s`.
    unsafe fn strlen(s: *const u8) -> usize {
        CStr::from_ptr(s as *const i8).to_bytes().len()
    }

    /// Returns a slice covering the null-terminated string `s`, terminator
    /// included.
    unsafe fn cstr_mut_slice_with_nul_from_ptr(s: *mut u8) -> &'static mut [u8] {
        std::slice::from_raw_parts_mut(s, strlen(s) + 1)
    }

    /// Returns a pointer to a leaked clone of `s`, terminator included.
    fn cstr_clone(s: &mut [u8]) -> *mut u8 {
        let mut clone = Vec::with_capacity(s.len());
        clone.extend_from_slice(s);
        clone.leak().as_mut_ptr()
    }

    /// Changes the process name, as shown by `ps`, to exactly `title`
    /// (ellipsized if it exceeds the space the original arguments occupied).
    pub fn set(title: &str) {
        if let Some(ref mut region) = *TITLE.lock().unwrap() {
            region.set(title);
        }
    }

    // The following is adapted from the Rust standard library.
    #[used]
    #[link_section = ".init_array"]
    static ARGV_INIT_ARRAY: extern "C" fn(
        std::os::raw::c_int,
        *mut *mut u8,
        *const *const u8,
    ) = {
        extern "C" fn init_wrapper(argc: c_int, argv: *mut *mut u8, _envp: *const *const u8) {
            *TITLE.lock().unwrap() = unsafe { ArgvRegion::new(argc, argv) };
        }
        init_wrapper
    };
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
pub use linux::set;

#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
pub fn set(_title: &str) {
    // Don't know how to set the process title on this operating system.
}
