use std::path::Path;

use anyhow::{anyhow, Result};
use tracing::error;
use windows::{
    core::PWSTR,
    Win32::{
        Foundation::{CloseHandle, GetLastError, BOOL, HANDLE, HWND},
        System::{
            Diagnostics::Debug::{
                FormatMessageW, FORMAT_MESSAGE_FROM_SYSTEM, FORMAT_MESSAGE_IGNORE_INSERTS,
            },
            SystemServices::{LANG_ENGLISH, SUBLANG_ENGLISH_US},
            Threading::{
                OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32,
                PROCESS_QUERY_LIMITED_INFORMATION,
            },
        },
        UI::WindowsAndMessaging::{
            GetForegroundWindow, GetWindowTextW, GetWindowThreadProcessId, IsIconic,
        },
    },
};

use super::{ForegroundProbe, RawWindow};

/// Foreground probe for Windows. Virtual-desktop membership requires the COM
/// desktop manager which is not always available; when it cannot be consulted
/// the window is assumed to be on the current desktop so tracking keeps
/// working.
pub struct WindowsProbe {}

impl WindowsProbe {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for WindowsProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ForegroundProbe for WindowsProbe {
    fn foreground(&mut self) -> Result<Option<RawWindow>> {
        get_foreground().inspect_err(|e| error!("Failed to probe foreground window {e:?}"))
    }
}

fn get_foreground() -> Result<Option<RawWindow>> {
    let window = unsafe { GetForegroundWindow() };
    if window.is_invalid() {
        return Ok(None);
    }

    let mut pid = 0u32;
    unsafe { GetWindowThreadProcessId(window, Some(&mut pid)) };
    if pid == 0 {
        return Err(anyhow!("Failed to resolve owning process: {}", last_error_message()));
    }

    let minimized = unsafe { IsIconic(window) }.as_bool();

    let mut text: [u16; 4096] = [0; 4096];
    let title = unsafe { get_window_title(window, &mut text) };

    let exe_path = match resolve_exe_path(pid, &mut text) {
        Ok(v) => v,
        // An inaccessible process is still a trackable window; the
        // classifier decides what to do with an empty path.
        Err(e) => {
            error!("Failed to resolve executable for pid {pid} {e:?}");
            String::new()
        }
    };

    let process_name = Path::new(&exe_path)
        .file_stem()
        .map(|v| v.to_string_lossy().to_string())
        .unwrap_or_default();

    Ok(Some(RawWindow {
        process_id: pid,
        process_name,
        window_title: title,
        exe_path,
        minimized,
        on_current_desktop: true,
    }))
}

fn resolve_exe_path(pid: u32, text: &mut [u16]) -> Result<String> {
    let handle: HANDLE =
        unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, BOOL::from(false), pid) }?;

    let result = unsafe { query_image_name(handle, text) };

    unsafe { CloseHandle(handle) }.inspect_err(|e| error!("Failed to close handle {e:?}"))?;

    result
}

unsafe fn query_image_name(handle: HANDLE, text: &mut [u16]) -> Result<String> {
    let mut length = text.len() as u32;
    QueryFullProcessImageNameW(
        handle,
        PROCESS_NAME_WIN32,
        PWSTR(text.as_mut_ptr()),
        &mut length,
    )?;
    Ok(String::from_utf16_lossy(&text[..length as usize]))
}

unsafe fn get_window_title(window: HWND, text: &mut [u16]) -> String {
    let len = GetWindowTextW(window, text);
    String::from_utf16_lossy(&text[..len as usize])
}

/// Reads ProductName from the executable's version resource. Missing or
/// unreadable resources are common (system binaries, packaged apps), so every
/// failure maps to `None`.
pub fn product_name(exe_path: &Path) -> Option<String> {
    use windows::{
        core::{w, HSTRING},
        Win32::Storage::FileSystem::{
            GetFileVersionInfoSizeW, GetFileVersionInfoW, VerQueryValueW,
        },
    };

    let wide = HSTRING::from(exe_path.as_os_str());
    let size = unsafe { GetFileVersionInfoSizeW(&wide, None) };
    if size == 0 {
        return None;
    }

    let mut data = vec![0u8; size as usize];
    unsafe { GetFileVersionInfoW(&wide, 0, size, data.as_mut_ptr().cast()) }.ok()?;

    let mut value: *mut core::ffi::c_void = std::ptr::null_mut();
    let mut len = 0u32;
    let found = unsafe {
        VerQueryValueW(
            data.as_ptr().cast(),
            w!("\\StringFileInfo\\040904b0\\ProductName"),
            &mut value,
            &mut len,
        )
    };
    if !found.as_bool() || value.is_null() || len == 0 {
        return None;
    }

    let chars = unsafe { std::slice::from_raw_parts(value.cast::<u16>(), len as usize) };
    let name = String::from_utf16_lossy(chars)
        .trim_end_matches('\0')
        .trim()
        .to_string();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

fn last_error_message() -> String {
    let err = unsafe { GetLastError() };
    let mut message_buffer = [0u16; 2048];
    let size = unsafe {
        FormatMessageW(
            FORMAT_MESSAGE_FROM_SYSTEM | FORMAT_MESSAGE_IGNORE_INSERTS,
            None,
            err.0,
            LANG_ENGLISH | (SUBLANG_ENGLISH_US << 10),
            PWSTR::from_raw(message_buffer.as_mut_ptr()),
            2048,
            None,
        )
    };
    if size == 0 {
        format!("error code {}", err.0)
    } else {
        String::from_utf16_lossy(&message_buffer[0..size as usize])
    }
}
