use rand::RngCore;

pub fn new_run_id() -> String {
	let mut buf = [0u8; 12];
	rand::thread_rng().fill_bytes(&mut buf);
	format!("run-{}", hex::encode(buf))
}
