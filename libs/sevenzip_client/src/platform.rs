//! Best-effort post-start process priority/affinity control.
//!
//! Per the spec, priority and affinity are set *after* the child starts
//! (`New-Object System.Diagnostics.Process` + assignment, in the
//! PowerShell original); failure to apply either is a warning, not a
//! fatal error, on every platform.

use crate::types::ProcessPriority;

#[cfg(windows)]
mod imp {
    use super::ProcessPriority;
    use windows_sys::Win32::Foundation::CloseHandle;
    use windows_sys::Win32::System::Threading::{
        OpenProcess, SetPriorityClass, SetProcessAffinityMask, ABOVE_NORMAL_PRIORITY_CLASS,
        BELOW_NORMAL_PRIORITY_CLASS, HIGH_PRIORITY_CLASS, IDLE_PRIORITY_CLASS,
        NORMAL_PRIORITY_CLASS, PROCESS_SET_INFORMATION,
    };

    fn priority_class(priority: ProcessPriority) -> u32 {
        match priority {
            ProcessPriority::Idle => IDLE_PRIORITY_CLASS,
            ProcessPriority::BelowNormal => BELOW_NORMAL_PRIORITY_CLASS,
            ProcessPriority::Normal => NORMAL_PRIORITY_CLASS,
            ProcessPriority::AboveNormal => ABOVE_NORMAL_PRIORITY_CLASS,
            ProcessPriority::High => HIGH_PRIORITY_CLASS,
        }
    }

    pub fn set_priority(pid: u32, priority: ProcessPriority) -> Result<(), String> {
        unsafe {
            let handle = OpenProcess(PROCESS_SET_INFORMATION, 0, pid);
            if handle == 0 {
                return Err(format!("OpenProcess failed for pid {pid}"));
            }
            let ok = SetPriorityClass(handle, priority_class(priority));
            CloseHandle(handle);
            if ok == 0 {
                return Err(format!("SetPriorityClass failed for pid {pid}"));
            }
        }
        Ok(())
    }

    pub fn set_affinity(pid: u32, mask: u64) -> Result<(), String> {
        unsafe {
            let handle = OpenProcess(PROCESS_SET_INFORMATION, 0, pid);
            if handle == 0 {
                return Err(format!("OpenProcess failed for pid {pid}"));
            }
            let ok = SetProcessAffinityMask(handle, mask as usize);
            CloseHandle(handle);
            if ok == 0 {
                return Err(format!("SetProcessAffinityMask failed for pid {pid}"));
            }
        }
        Ok(())
    }
}

#[cfg(unix)]
mod imp {
    use super::ProcessPriority;

    fn niceness(priority: ProcessPriority) -> i32 {
        match priority {
            ProcessPriority::Idle => 19,
            ProcessPriority::BelowNormal => 10,
            ProcessPriority::Normal => 0,
            ProcessPriority::AboveNormal => -5,
            ProcessPriority::High => -10,
        }
    }

    pub fn set_priority(pid: u32, priority: ProcessPriority) -> Result<(), String> {
        let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS, pid, niceness(priority)) };
        if rc == 0 {
            Ok(())
        } else {
            Err(format!(
                "setpriority({pid}) failed (requires elevated privileges to raise priority)"
            ))
        }
    }

    #[cfg(target_os = "linux")]
    pub fn set_affinity(pid: u32, mask: u64) -> Result<(), String> {
        unsafe {
            let mut set: libc::cpu_set_t = std::mem::zeroed();
            libc::CPU_ZERO(&mut set);
            for bit in 0..64 {
                if mask & (1 << bit) != 0 {
                    libc::CPU_SET(bit, &mut set);
                }
            }
            let rc = libc::sched_setaffinity(
                pid as libc::pid_t,
                std::mem::size_of::<libc::cpu_set_t>(),
                &set,
            );
            if rc == 0 {
                Ok(())
            } else {
                Err(format!("sched_setaffinity({pid}) failed"))
            }
        }
    }

    #[cfg(not(target_os = "linux"))]
    pub fn set_affinity(_pid: u32, _mask: u64) -> Result<(), String> {
        Err("CPU affinity is not supported on this platform".to_string())
    }
}

/// Sets the child's scheduling priority. Best-effort: any failure is
/// returned as a message for the caller to log at WARNING and continue.
pub fn set_priority(pid: u32, priority: ProcessPriority) -> Result<(), String> {
    imp::set_priority(pid, priority)
}

/// Applies an affinity bitmask to the child. Best-effort, same as
/// `set_priority`.
pub fn set_affinity(pid: u32, mask: u64) -> Result<(), String> {
    imp::set_affinity(pid, mask)
}
