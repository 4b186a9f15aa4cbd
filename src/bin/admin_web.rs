use shopbot::system::{Role, System};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	System::run(Role::AdminWeb).await
}
