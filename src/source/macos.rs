use std::ffi::CString;
use std::mem::{self, MaybeUninit};
use std::process::Output;
use std::ptr;
use std::time::Duration;

use libc::{
    c_void, host_statistics64, mach_msg_type_number_t, natural_t, processor_info_array_t,
    vm_statistics64, HOST_VM_INFO64, HOST_VM_INFO64_COUNT,
};
use log::debug;
use tokio::process::Command;
use tokio::runtime::{Builder, Handle};
use tokio::time::timeout;

use super::ioreg;
use super::CounterError;
use crate::metrics::{first_utilization, CpuTicks, RawCpuSample, RawMemorySample};

const IOREG_PATH: &str = "/usr/sbin/ioreg";
/// An `ioreg` child still running after this is killed.
const IOREG_DEADLINE: Duration = Duration::from_secs(2);

pub(super) fn read_cpu_ticks() -> Result<RawCpuSample, CounterError> {
    let mut cpu_count: natural_t = 0;
    let mut info: processor_info_array_t = ptr::null_mut();
    let mut info_count: mach_msg_type_number_t = 0;

    let result = unsafe {
        #[allow(deprecated)]
        let host = libc::mach_host_self();
        libc::host_processor_info(
            host,
            libc::PROCESSOR_CPU_LOAD_INFO,
            &mut cpu_count,
            &mut info,
            &mut info_count,
        )
    };
    if result != libc::KERN_SUCCESS || info.is_null() {
        return Err(CounterError::MachCall {
            call: "host_processor_info",
            code: result,
        });
    }

    let states = libc::CPU_STATE_MAX as usize;
    let cores = {
        // SAFETY: the kernel returned `info_count` integers at `info`.
        let raw = unsafe { std::slice::from_raw_parts(info, info_count as usize) };
        raw.chunks_exact(states)
            .take(cpu_count as usize)
            .map(|core| {
                // ticks are unsigned 32-bit counters handed back as integer_t
                let tick = |state: libc::c_int| core[state as usize] as u32 as u64;
                CpuTicks::new(
                    tick(libc::CPU_STATE_USER),
                    tick(libc::CPU_STATE_SYSTEM),
                    tick(libc::CPU_STATE_NICE),
                    tick(libc::CPU_STATE_IDLE),
                )
            })
            .collect()
    };

    unsafe {
        #[allow(deprecated)]
        let task = libc::mach_task_self();
        libc::vm_deallocate(
            task,
            info as libc::vm_address_t,
            info_count as libc::vm_size_t * mem::size_of::<libc::integer_t>() as libc::vm_size_t,
        );
    }

    Ok(RawCpuSample::new(cores))
}

pub(super) fn read_memory_stats(total_bytes: u64) -> Result<RawMemorySample, CounterError> {
    let stats = unsafe {
        #[allow(deprecated)]
        let host = libc::mach_host_self();

        let mut stats = MaybeUninit::<vm_statistics64>::uninit();
        let mut count: mach_msg_type_number_t = HOST_VM_INFO64_COUNT;
        let result = host_statistics64(
            host,
            HOST_VM_INFO64,
            stats.as_mut_ptr() as *mut _,
            &mut count,
        );
        if result != 0 {
            return Err(CounterError::MachCall {
                call: "host_statistics64",
                code: result,
            });
        }
        stats.assume_init()
    };

    let page_size = match unsafe { libc::sysconf(libc::_SC_PAGESIZE) } {
        size if size > 0 => size as u64,
        _ => return Err(CounterError::Unavailable("page size")),
    };

    Ok(RawMemorySample {
        free: stats.free_count as u64,
        inactive: stats.inactive_count as u64,
        purgeable: stats.purgeable_count as u64,
        speculative: stats.speculative_count as u64,
        page_size,
        total_bytes,
    })
}

pub(super) fn read_sysctl_u64(name: &str) -> Result<u64, CounterError> {
    let c_name = CString::new(name).map_err(|_| CounterError::parse("sysctl name", name))?;
    let mut size: libc::size_t = mem::size_of::<u64>() as libc::size_t;
    let mut value: u64 = 0;
    let result = unsafe {
        libc::sysctlbyname(
            c_name.as_ptr(),
            &mut value as *mut u64 as *mut c_void,
            &mut size as *mut libc::size_t,
            ptr::null_mut(),
            0,
        )
    };
    if result != 0 {
        return Err(CounterError::Sysctl {
            name: name.to_string(),
            source: std::io::Error::last_os_error(),
        });
    }
    Ok(value)
}

pub(super) fn read_accelerator_utilization() -> Option<f64> {
    let listing = ioreg_class("IOAccelerator")?;
    first_utilization(ioreg::accelerator_devices(&listing))
}

pub(super) fn read_power_milliwatts() -> Option<i64> {
    let listing = ioreg_class("AppleSmartBattery")?;
    ioreg::system_power_in(&listing)
}

/// `ioreg -r -w0 -c <class>`: every registry entry of `class` with its
/// properties, one property per line.
fn ioreg_class(class: &str) -> Option<String> {
    let output = run_ioreg(class)?;
    if !output.status.success() {
        debug!("ioreg {} exited with {}", class, output.status);
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Runs on a blocking thread, so it may block on the sampler's runtime.
/// Callers without a runtime get a throwaway one.
fn run_ioreg(class: &str) -> Option<Output> {
    let run = async {
        let child = Command::new(IOREG_PATH)
            .args(["-r", "-w0", "-c", class])
            .kill_on_drop(true)
            .output();
        match timeout(IOREG_DEADLINE, child).await {
            Ok(Ok(output)) => Some(output),
            Ok(Err(err)) => {
                debug!("ioreg {} failed to start: {}", class, err);
                None
            }
            Err(_) => {
                debug!("ioreg {} exceeded {:?}; killed", class, IOREG_DEADLINE);
                None
            }
        }
    };
    match Handle::try_current() {
        Ok(handle) => handle.block_on(run),
        Err(_) => Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| debug!("no runtime for ioreg {}: {}", class, err))
            .ok()?
            .block_on(run),
    }
}
