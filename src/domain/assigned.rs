//! Assigned numbers
//!
//! Read-only lookup tables shared by the decoders. Everything here is a
//! `static` slice, so lookups never allocate and nothing is mutated after
//! the program starts.

/// GAP advertising data types
pub mod ad_type {
    pub const FLAGS: u8 = 0x01;
    pub const INCOMPLETE_16_BIT_UUIDS: u8 = 0x02;
    pub const COMPLETE_16_BIT_UUIDS: u8 = 0x03;
    pub const INCOMPLETE_32_BIT_UUIDS: u8 = 0x04;
    pub const COMPLETE_32_BIT_UUIDS: u8 = 0x05;
    pub const INCOMPLETE_128_BIT_UUIDS: u8 = 0x06;
    pub const COMPLETE_128_BIT_UUIDS: u8 = 0x07;
    pub const SHORTENED_LOCAL_NAME: u8 = 0x08;
    pub const COMPLETE_LOCAL_NAME: u8 = 0x09;
    pub const TX_POWER_LEVEL: u8 = 0x0A;
    pub const SERVICE_DATA_16_BIT_UUID: u8 = 0x16;
    pub const SERVICE_DATA_32_BIT_UUID: u8 = 0x20;
    pub const SERVICE_DATA_128_BIT_UUID: u8 = 0x21;
    pub const MANUFACTURER_SPECIFIC_DATA: u8 = 0xFF;
}

static AD_TYPE_NAMES: &[(u8, &str)] = &[
    (0x01, "Flags"),
    (0x02, "Incomplete List of 16-bit Service Class UUIDs"),
    (0x03, "Complete List of 16-bit Service Class UUIDs"),
    (0x04, "Incomplete List of 32-bit Service Class UUIDs"),
    (0x05, "Complete List of 32-bit Service Class UUIDs"),
    (0x06, "Incomplete List of 128-bit Service Class UUIDs"),
    (0x07, "Complete List of 128-bit Service Class UUIDs"),
    (0x08, "Shortened Local Name"),
    (0x09, "Complete Local Name"),
    (0x0A, "Tx Power Level"),
    (0x0D, "Class of Device"),
    (0x0E, "Simple Pairing Hash C-192"),
    (0x0F, "Simple Pairing Randomizer R-192"),
    (0x10, "Device ID"),
    (0x11, "Security Manager Out of Band Flags"),
    (0x12, "Peripheral Connection Interval Range"),
    (0x14, "List of 16-bit Service Solicitation UUIDs"),
    (0x15, "List of 128-bit Service Solicitation UUIDs"),
    (0x16, "Service Data - 16-bit UUID"),
    (0x17, "Public Target Address"),
    (0x18, "Random Target Address"),
    (0x19, "Appearance"),
    (0x1A, "Advertising Interval"),
    (0x1B, "LE Bluetooth Device Address"),
    (0x1C, "LE Role"),
    (0x1F, "List of 32-bit Service Solicitation UUIDs"),
    (0x20, "Service Data - 32-bit UUID"),
    (0x21, "Service Data - 128-bit UUID"),
    (0x24, "URI"),
    (0x27, "LE Supported Features"),
    (0x2C, "BIGInfo"),
    (0x2D, "Broadcast_Code"),
    (0xFF, "Manufacturer Specific Data"),
];

static SERVICE_NAMES: &[(u16, &str)] = &[
    (0x1800, "Generic Access"),
    (0x1801, "Generic Attribute"),
    (0x1802, "Immediate Alert"),
    (0x1803, "Link Loss"),
    (0x1804, "Tx Power"),
    (0x1805, "Current Time"),
    (0x180A, "Device Information"),
    (0x180D, "Heart Rate"),
    (0x180F, "Battery"),
    (0x1811, "Alert Notification Service"),
    (0x1812, "Human Interface Device"),
    (0x181C, "User Data"),
    (0xFE59, "Nordic DFU"),
];

static CHARACTERISTIC_NAMES: &[(u16, &str)] = &[
    (0x2A00, "Device Name"),
    (0x2A01, "Appearance"),
    (0x2A02, "Peripheral Privacy Flag"),
    (0x2A03, "Reconnection Address"),
    (0x2A04, "Peripheral Preferred Connection Parameters"),
    (0x2A05, "Service Changed"),
    (0x2A06, "Alert Level"),
    (0x2A07, "Tx Power Level"),
    (0x2A19, "Battery Level"),
    (0x2A23, "System ID"),
    (0x2A24, "Model Number String"),
    (0x2A25, "Serial Number String"),
    (0x2A26, "Firmware Revision String"),
    (0x2A27, "Hardware Revision String"),
    (0x2A28, "Software Revision String"),
    (0x2A29, "Manufacturer Name String"),
    (0x2A2A, "IEEE 11073-20601 Regulatory Certification Data List"),
    (0x2A37, "Heart Rate Measurement"),
    (0x2A38, "Body Sensor Location"),
    (0x2A39, "Heart Rate Control Point"),
    (0x2A44, "Alert Notification Control Point"),
    (0x2A45, "Unread Alert Status"),
    (0x2A46, "New Alert"),
    (0x2A47, "Supported New Alert Category"),
    (0x2A48, "Supported Unread Alert Category"),
    (0x2A4D, "Report"),
    (0x2A50, "PnP ID"),
    (0x2AA6, "Central Address Resolution"),
    (0x2B29, "Client Supported Features"),
    (0x2B2A, "Database Hash"),
];

static DESCRIPTOR_NAMES: &[(u16, &str)] = &[
    (0x2900, "Characteristic Extended Properties"),
    (0x2901, "Characteristic User Description"),
    (0x2902, "Client Characteristic Configuration"),
    (0x2903, "Server Characteristic Configuration"),
    (0x2904, "Characteristic Presentation Format"),
    (0x2905, "Characteristic Aggregate Format"),
    (0x2908, "Report Reference"),
];

// Small subset of the company identifier registry; extend as needed.
static COMPANY_NAMES: &[(u16, &str)] = &[
    (0x0000, "Ericsson Technology Licensing"),
    (0x0002, "Intel Corp."),
    (0x0006, "Microsoft"),
    (0x000F, "Broadcom Corporation"),
    (0x004C, "Apple, Inc."),
    (0x0059, "Nordic Semiconductor ASA"),
    (0x0075, "Samsung Electronics Co. Ltd."),
    (0x0087, "Garmin International, Inc."),
    (0x00E0, "Google"),
    (0x0171, "Amazon.com Services, LLC"),
    (0x02E5, "Espressif Incorporated"),
    (0x038F, "Xiaomi Inc."),
];

static ATT_ERROR_NAMES: &[(u8, &str)] = &[
    (0x01, "Invalid Handle"),
    (0x02, "Read Not Permitted"),
    (0x03, "Write Not Permitted"),
    (0x04, "Invalid PDU"),
    (0x05, "Insufficient Authentication"),
    (0x06, "Request Not Supported"),
    (0x07, "Invalid Offset"),
    (0x08, "Insufficient Authorization"),
    (0x09, "Prepare Queue Full"),
    (0x0A, "Attribute Not Found"),
    (0x0B, "Attribute Not Long"),
    (0x0C, "Encryption Key Size Too Short"),
    (0x0D, "Invalid Attribute Value Length"),
    (0x0E, "Unlikely Error"),
    (0x0F, "Insufficient Encryption"),
    (0x10, "Unsupported Group Type"),
    (0x11, "Insufficient Resources"),
    (0x12, "Database Out Of Sync"),
    (0x13, "Value Not Allowed"),
];

fn lookup<K: PartialEq + Copy>(table: &'static [(K, &'static str)], key: K) -> Option<&'static str> {
    table.iter().find(|(k, _)| *k == key).map(|(_, name)| *name)
}

pub fn ad_type_name(ad_type: u8) -> Option<&'static str> {
    lookup(AD_TYPE_NAMES, ad_type)
}

pub fn service_name(uuid16: u16) -> Option<&'static str> {
    lookup(SERVICE_NAMES, uuid16)
}

pub fn characteristic_name(uuid16: u16) -> Option<&'static str> {
    lookup(CHARACTERISTIC_NAMES, uuid16)
}

pub fn descriptor_name(uuid16: u16) -> Option<&'static str> {
    lookup(DESCRIPTOR_NAMES, uuid16)
}

pub fn company_name(company_id: u16) -> Option<&'static str> {
    lookup(COMPANY_NAMES, company_id)
}

pub fn att_error_name(code: u8) -> Option<&'static str> {
    match code {
        0x80..=0x9F => Some("Application Error"),
        0xE0..=0xFF => Some("Common Profile and Service Error"),
        _ => lookup(ATT_ERROR_NAMES, code),
    }
}
