#![no_main]
use libfuzzer_sys::fuzz_target;
use icesmtp_protocol::{parse_helo_hostname, parse_mail_path, PathPrefix};

fuzz_target!(|data: &[u8]| {
    if let Ok(argument) = std::str::from_utf8(data) {
        let _ = parse_mail_path(argument, PathPrefix::From);
        let _ = parse_mail_path(argument, PathPrefix::To);
        let _ = parse_helo_hostname(argument);
    }
});
