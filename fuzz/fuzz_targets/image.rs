#![no_main]

use libfuzzer_sys::fuzz_target;
use dotpatch::metadata::{
    image::{decode_module, decode_symbols},
    module::Module,
};

fuzz_target!(|data: &[u8]| {
    let _ = decode_module(data);
    let mut module = Module::new("Fuzz");
    let _ = decode_symbols(&mut module, data);
});
