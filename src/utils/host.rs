//! Host identity resolution.

/// Resolve this machine's identifier: `/etc/hostname`, then
/// `gethostname(2)`, then the literal "local".
///
/// Resolved once at startup and passed into the engine explicitly so
/// tests and multi-host stores can use arbitrary identifiers.
pub fn resolve_host_id() -> String {
    if let Ok(contents) = std::fs::read_to_string("/etc/hostname") {
        let name = contents.trim();
        if !name.is_empty() {
            return name.to_string();
        }
    }

    let mut buf = [0u8; 256];
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if rc == 0 {
        let end = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
        if let Ok(name) = std::str::from_utf8(&buf[..end]) {
            if !name.is_empty() {
                return name.to_string();
            }
        }
    }

    "local".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_to_non_empty_identifier() {
        assert!(!resolve_host_id().is_empty());
    }
}
