use std::sync::atomic::{AtomicUsize, Ordering};

pub(crate) use data::DataFile;
pub(crate) use file::File;

pub(crate) mod bytes;
pub(crate) mod data;
pub(crate) mod file;

/// Obtains the operating system's memory page size.
pub(crate) fn os_page_size() -> usize {
    static PAGE_SIZE: AtomicUsize = AtomicUsize::new(0);

    match PAGE_SIZE.load(Ordering::Acquire) {
        0 => {
            let page_size = unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) };
            // `sysconf` reports -1 when the value is indeterminate.
            let page_size = if page_size > 0 {
                page_size as usize
            } else {
                4096
            };
            PAGE_SIZE.store(page_size, Ordering::Release);
            page_size
        }
        page_size => page_size,
    }
}
