//! WLAN API: open a client handle, enumerate interfaces, and read the
//! current connection's SSID/signal/channel (§4.3.10).

use spectra_types::{Error, Metric, Result, WifiMetric};
use windows_sys::Win32::Foundation::{ERROR_SUCCESS, HANDLE};
use windows_sys::Win32::NetworkManagement::WiFi::{
    WlanCloseHandle, WlanEnumInterfaces, WlanFreeMemory, WlanOpenHandle, WlanQueryInterface,
    WLAN_CONNECTION_ATTRIBUTES, WLAN_INTERFACE_INFO_LIST, WLAN_INTERFACE_STATE_CONNECTED,
    wlan_intf_opcode_channel_number, wlan_intf_opcode_current_connection,
};

/// 802.11 channel → center frequency (GHz); only the common 2.4/5 GHz
/// bands are tabulated (§4.3.10, §GLOSSARY).
fn channel_to_ghz(channel: u32) -> f64 {
    match channel {
        1..=13 => 2.412 + 0.005 * (channel as f64 - 1.0),
        14 => 2.484,
        36..=165 => 5.000 + 0.005 * channel as f64,
        _ => 0.0,
    }
}

pub fn read() -> Result<Vec<Metric>> {
    let mut handle: HANDLE = std::ptr::null_mut();
    let mut negotiated_version = 0u32;
    let open_status = unsafe { WlanOpenHandle(2, std::ptr::null(), &mut negotiated_version, &mut handle) };
    if open_status != ERROR_SUCCESS {
        // No WLAN service running (e.g. a server SKU) - not an error condition worth surfacing.
        return Ok(Vec::new());
    }

    let mut metrics = Vec::new();
    let mut interface_list_ptr: *mut WLAN_INTERFACE_INFO_LIST = std::ptr::null_mut();
    let enum_status = unsafe { WlanEnumInterfaces(handle, std::ptr::null(), &mut interface_list_ptr) };

    if enum_status == ERROR_SUCCESS && !interface_list_ptr.is_null() {
        unsafe {
            let list = &*interface_list_ptr;
            let interfaces = std::slice::from_raw_parts(list.InterfaceInfo.as_ptr(), list.dwNumberOfItems as usize);

            for iface in interfaces {
                if iface.isState != WLAN_INTERFACE_STATE_CONNECTED {
                    continue;
                }

                let mut data_ptr: *mut core::ffi::c_void = std::ptr::null_mut();
                let mut data_size = 0u32;
                let query_status = WlanQueryInterface(
                    handle,
                    &iface.InterfaceGuid,
                    wlan_intf_opcode_current_connection,
                    std::ptr::null_mut(),
                    &mut data_size,
                    &mut data_ptr,
                    std::ptr::null_mut(),
                );
                if query_status != ERROR_SUCCESS || data_ptr.is_null() {
                    continue;
                }

                let attrs = &*(data_ptr as *const WLAN_CONNECTION_ATTRIBUTES);
                let assoc = &attrs.wlanAssociationAttributes;

                let ssid_len = assoc.dot11Ssid.uSSIDLength as usize;
                let ssid = String::from_utf8_lossy(&assoc.dot11Ssid.ucSSID[..ssid_len.min(32)]).into_owned();
                let link_quality_percent = assoc.wlanSignalQuality as f64;
                let signal_dbm = (link_quality_percent / 2.0 - 100.0) as i32;
                let interface_name = interface_name_from_guid_description(iface);
                let frequency_ghz = read_channel_ghz(handle, &iface.InterfaceGuid);

                metrics.push(Metric::Wifi(WifiMetric {
                    interface: interface_name,
                    ssid,
                    signal_dbm,
                    link_quality_percent,
                    frequency_ghz,
                    bitrate_mbps: assoc.ulRxRate as f64 / 1000.0,
                }));

                WlanFreeMemory(data_ptr);
            }
        }
    }
    if !interface_list_ptr.is_null() {
        unsafe { WlanFreeMemory(interface_list_ptr as *mut _) };
    }

    unsafe { WlanCloseHandle(handle, std::ptr::null()) };
    Ok(metrics)
}

unsafe fn read_channel_ghz(handle: HANDLE, guid: &windows_sys::core::GUID) -> f64 {
    let mut data_ptr: *mut core::ffi::c_void = std::ptr::null_mut();
    let mut data_size = 0u32;
    let status = WlanQueryInterface(
        handle,
        guid,
        wlan_intf_opcode_channel_number,
        std::ptr::null_mut(),
        &mut data_size,
        &mut data_ptr,
        std::ptr::null_mut(),
    );
    if status != ERROR_SUCCESS || data_ptr.is_null() {
        return 0.0;
    }
    let channel = *(data_ptr as *const u32);
    WlanFreeMemory(data_ptr);
    channel_to_ghz(channel)
}

fn interface_name_from_guid_description(iface: &windows_sys::Win32::NetworkManagement::WiFi::WLAN_INTERFACE_INFO) -> String {
    let end = iface.strInterfaceDescription.iter().position(|&c| c == 0).unwrap_or(iface.strInterfaceDescription.len());
    String::from_utf16_lossy(&iface.strInterfaceDescription[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_maps_into_24ghz_band() {
        assert!((channel_to_ghz(6) - 2.437).abs() < 0.001);
    }

    #[test]
    fn channel_maps_into_5ghz_band() {
        assert!((channel_to_ghz(36) - 5.180).abs() < 0.001);
    }

    #[test]
    fn unknown_channel_is_zero() {
        assert_eq!(channel_to_ghz(200), 0.0);
    }
}
