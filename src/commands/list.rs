//! MCU listing

use hkflasher_core::halfkay::PacketLayout;
use hkflasher_core::mcu::McuDatabase;

/// Print every known MCU with its memory layout
pub fn list_mcus(db: &McuDatabase) {
    println!("Supported MCUs:");
    println!();
    println!(
        "{:<18} {:>10} {:>8} {:>8}",
        "Name", "Flash", "Block", "Packet"
    );
    println!("{}", "-".repeat(47));

    for entry in db.iter() {
        let geometry = entry.geometry;
        let packet = match PacketLayout::select(geometry) {
            Ok(layout) => layout.packet_len(geometry.block_size).to_string(),
            Err(_) => "-".to_string(),
        };
        println!(
            "{:<18} {:>10} {:>8} {:>8}",
            entry.name,
            format_size(geometry.code_size),
            geometry.block_size,
            packet
        );
    }
}

fn format_size(bytes: u32) -> String {
    if bytes >= 1024 * 1024 && bytes % (1024 * 1024) == 0 {
        format!("{} MiB", bytes / (1024 * 1024))
    } else if bytes >= 1024 && bytes % 1024 == 0 {
        format!("{} KiB", bytes / 1024)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(1048576), "1 MiB");
        assert_eq!(format_size(262144), "256 KiB");
        assert_eq!(format_size(2031616), "1984 KiB");
        assert_eq!(format_size(32256), "32256 B");
    }
}
