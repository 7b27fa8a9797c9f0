#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = icesmtp_protocol::Parser::default().parse_command(data);
});
