//! Argument lists for the adb invocations the adapter issues.

use tapflow_domain::geometry::Point;

/// `adb connect <host:port>`.
pub(crate) fn connect(addr: &str) -> Vec<String> {
    vec!["connect".to_string(), addr.to_string()]
}

/// `adb [-s serial] exec-out screencap -p`, which writes a PNG to stdout.
pub(crate) fn screencap(serial: Option<&str>) -> Vec<String> {
    let mut args = target(serial);
    args.extend(["exec-out", "screencap", "-p"].map(String::from));
    args
}

/// `adb [-s serial] shell input tap <x> <y>`; negative coordinates clamp to 0.
pub(crate) fn tap(serial: Option<&str>, point: Point) -> Vec<String> {
    let mut args = target(serial);
    args.extend(["shell", "input", "tap"].map(String::from));
    args.push(point.x.max(0).to_string());
    args.push(point.y.max(0).to_string());
    args
}

/// Whether `adb connect` output reports success.
///
/// adb exits 0 even when the connection fails, so only the text is trusted.
/// Both `connected to` and `already connected to` count.
pub(crate) fn is_connected(output: &str) -> bool {
    output.contains("connected to")
}

fn target(serial: Option<&str>) -> Vec<String> {
    serial
        .map(|s| vec!["-s".to_string(), s.to_string()])
        .unwrap_or_default()
}
