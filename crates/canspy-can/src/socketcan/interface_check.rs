//! CAN 接口状态查询
//!
//! 通过 `if_nametoindex()` 和 `ioctl(SIOCGIFFLAGS / SIOCGIFMTU)` 读取接口是否存在、
//! 是否 UP 以及 MTU。只读操作，普通用户即可执行。

use crate::{CanDeviceError, CanDeviceErrorKind, CanError};
use libc::{AF_INET, IFF_UP, SIOCGIFFLAGS, SIOCGIFMTU, SOCK_DGRAM, if_nametoindex, ifreq};
use std::ffi::CString;
use std::io;
use tracing::trace;

/// 经典 CAN 接口的 MTU（`struct can_frame`）
pub const CAN_MTU: u32 = 16;

/// CAN FD 接口的 MTU（`struct canfd_frame`）
pub const CANFD_MTU: u32 = 72;

/// IFNAMSIZ - 1
const MAX_IFACE_NAME_LEN: usize = 15;

/// 接口查询结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceInfo {
    /// 接口索引
    pub index: u32,
    /// 管理态是否 UP
    pub up: bool,
    /// 接口 MTU
    pub mtu: u32,
}

impl InterfaceInfo {
    /// MTU 为 72 的接口可以收发 CAN FD 帧
    pub fn is_fd_capable(&self) -> bool {
        self.mtu >= CANFD_MTU
    }
}

/// 关闭 ioctl 用的临时 socket
struct FdGuard(libc::c_int);

impl Drop for FdGuard {
    fn drop(&mut self) {
        if self.0 >= 0 {
            unsafe { libc::close(self.0) };
        }
    }
}

fn not_found(interface: &str, reason: impl std::fmt::Display) -> CanError {
    CanError::Device(CanDeviceError::new(
        CanDeviceErrorKind::NotFound,
        format!("CAN interface '{}' does not exist ({})", interface, reason),
    ))
}

/// 查询接口信息
///
/// # 错误
/// - `CanError::Device(NotFound)`: 接口不存在或名称非法
/// - `CanError::Io`: socket/ioctl 调用失败
pub fn query_interface(interface: &str) -> Result<InterfaceInfo, CanError> {
    if interface.is_empty() || interface.len() > MAX_IFACE_NAME_LEN {
        return Err(not_found(
            interface,
            format!("name must be 1..={} characters", MAX_IFACE_NAME_LEN),
        ));
    }

    let c_iface = CString::new(interface).map_err(|e| not_found(interface, e))?;

    let index = unsafe { if_nametoindex(c_iface.as_ptr()) };
    if index == 0 {
        return Err(not_found(interface, io::Error::last_os_error()));
    }

    let sockfd = unsafe { libc::socket(AF_INET, SOCK_DGRAM, 0) };
    if sockfd < 0 {
        return Err(CanError::Io(io::Error::last_os_error()));
    }
    let guard = FdGuard(sockfd);

    let mut ifr: ifreq = unsafe { std::mem::zeroed() };
    for (dst, src) in ifr.ifr_name.iter_mut().zip(interface.as_bytes()) {
        *dst = *src as libc::c_char;
    }

    // ifr_ifru 是 union：SIOCGIFFLAGS 写入 c_short，SIOCGIFMTU 写入 c_int，均位于偏移 0
    let flags = unsafe {
        if libc::ioctl(guard.0, SIOCGIFFLAGS, &mut ifr as *mut ifreq) < 0 {
            return Err(CanError::Io(io::Error::last_os_error()));
        }
        *(std::ptr::addr_of!(ifr.ifr_ifru) as *const libc::c_short)
    };

    let mtu = unsafe {
        if libc::ioctl(guard.0, SIOCGIFMTU, &mut ifr as *mut ifreq) < 0 {
            return Err(CanError::Io(io::Error::last_os_error()));
        }
        *(std::ptr::addr_of!(ifr.ifr_ifru) as *const libc::c_int)
    };

    let info = InterfaceInfo {
        index,
        up: (i32::from(flags) & IFF_UP) != 0,
        mtu: mtu.max(0) as u32,
    };
    trace!(
        "Interface '{}': index={}, {}, mtu={}",
        interface,
        info.index,
        if info.up { "UP" } else { "DOWN" },
        info.mtu
    );
    Ok(info)
}
