use rand::RngCore;

fn random_hex(bytes: usize) -> String {
	let mut buf = vec![0u8; bytes];
	rand::thread_rng().fill_bytes(&mut buf);
	hex::encode(buf)
}

pub fn new_workflow_id() -> String {
	format!("wf_{}", random_hex(12))
}

pub fn new_request_id() -> String {
	format!("reexec_{}", random_hex(12))
}
