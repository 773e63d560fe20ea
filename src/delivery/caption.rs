//! Size formatting and captions for uploaded files

const KIB: f64 = 1024.0;
const MIB: f64 = KIB * 1024.0;
const GIB: f64 = MIB * 1024.0;

/// `512B`, `1.5KB`, `12.34MB`, `1.95GB`
pub fn format_bytes(bytes: u64) -> String {
    let b = bytes as f64;
    if b < KIB {
        format!("{bytes}B")
    } else if b < MIB {
        format!("{:.1}KB", b / KIB)
    } else if b < GIB {
        format!("{:.2}MB", b / MIB)
    } else {
        format!("{:.2}GB", b / GIB)
    }
}

/// File size for captions; `Unknown` for zero
pub fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return "Unknown".to_string();
    }
    let b = bytes as f64;
    if b < MIB {
        format!("{:.2} KB", b / KIB)
    } else {
        format!("{:.2} MB", b / MIB)
    }
}

/// Caption attached to an uploaded file or part
pub fn upload_caption(name: &str, size: u64, part: Option<(usize, usize)>) -> String {
    match part {
        Some((i, n)) => format!("📹 {name}\n💾 Part {i}/{n}\n📏 Size: {}", format_bytes(size)),
        None => format!("📹 {name}\n💾 Size: {}", format_size(size)),
    }
}
