//! `GetIfTable2` (§4.3.5). Virtual/tunnel adapters are filtered by a name
//! substring denylist; down, loopback, and zero-counter interfaces are
//! dropped too.

use spectra_types::{Error, NetIfRaw, Result};
use windows_sys::Win32::Foundation::NO_ERROR;
use windows_sys::Win32::NetworkManagement::IpHelper::{FreeMibTable, GetIfTable2, MIB_IF_TABLE2};
use windows_sys::Win32::NetworkManagement::Ndis::IfOperStatusUp;

const IGNORE_SUBSTRINGS: &[&str] = &[
    "Virtual Switch",
    "Miniport",
    "Pseudo-Interface",
    "QoS",
    "Filter",
    "Npcap",
    "Teredo",
    "IP-HTTPS",
    "6to4",
    "Virtual Ethernet",
    "Kernel Debug",
];

const LOOPBACK_IF_TYPE: u32 = 24;

pub fn read_interfaces() -> Result<Vec<NetIfRaw>> {
    let mut table_ptr: *mut MIB_IF_TABLE2 = std::ptr::null_mut();
    let status = unsafe { GetIfTable2(&mut table_ptr) };
    if status != NO_ERROR || table_ptr.is_null() {
        return Err(Error::Platform(format!("GetIfTable2 failed with status {status}")));
    }

    let mut out = Vec::new();
    unsafe {
        let table = &*table_ptr;
        let rows = std::slice::from_raw_parts(table.Table.as_ptr(), table.NumEntries as usize);

        for row in rows {
            let name = String::from_utf16_lossy(&row.Alias)
                .trim_end_matches('\0')
                .to_string();

            if name.ends_with("-0000") || IGNORE_SUBSTRINGS.iter().any(|s| name.contains(s)) {
                continue;
            }
            if row.OperStatus != IfOperStatusUp || row.Type == LOOPBACK_IF_TYPE {
                continue;
            }

            let rx_bytes = row.InOctets;
            let tx_bytes = row.OutOctets;
            if rx_bytes == 0 && tx_bytes == 0 {
                continue;
            }

            let clamp = |v: u64| if v == u64::MAX { 0 } else { v };
            let mac_address = row.PhysicalAddress[..row.PhysicalAddressLength as usize]
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect::<Vec<_>>()
                .join(":");

            out.push(NetIfRaw {
                ifindex: row.InterfaceIndex,
                name,
                mac_address,
                mtu: row.Mtu,
                link_speed_bps: clamp(row.TransmitLinkSpeed),
                rx_bytes: clamp(rx_bytes),
                rx_packets: clamp(row.InUcastPkts + row.InNUcastPkts),
                rx_errors: clamp(row.InErrors),
                rx_drops: clamp(row.InDiscards),
                tx_bytes: clamp(tx_bytes),
                tx_packets: clamp(row.OutUcastPkts + row.OutNUcastPkts),
                tx_errors: clamp(row.OutErrors),
                tx_drops: clamp(row.OutDiscards),
            });
        }

        FreeMibTable(table_ptr as *const _);
    }

    Ok(out)
}
