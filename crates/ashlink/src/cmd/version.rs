use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("ashlink {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: ashlink");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("target: {}", env!("ASHLINK_BUILD_TARGET"));
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "rustc: {}",
        option_env!("RUSTC_VERSION").unwrap_or("unknown")
    );
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!(
        "protocol: ASH v{}, max window {}",
        ashlink_frame::ASH_VERSION,
        ashlink_host::config::MAX_WINDOW_SIZE
    );

    Ok(SUCCESS)
}
