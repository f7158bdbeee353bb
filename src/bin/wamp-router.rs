use argparse::{ArgumentParser, Collect, Store, StoreTrue};
use log::info;

use wamp_router::router::{Router, RouterConfig};
use wamp_router::ValidationMode;

fn main() {
    let mut bind = "127.0.0.1:8090".to_string();
    let mut realms: Vec<String> = Vec::new();
    let mut default_realm = String::new();
    let mut validation_mode = "strict".to_string();
    let mut auto_create_realms = false;
    let mut abort_on_protocol_violation = false;
    let mut verbose = false;

    {
        let mut parser = ArgumentParser::new();
        parser.set_description("WAMP v2 basic-profile router");
        parser.refer(&mut bind).add_option(
            &["--bind"],
            Store,
            "Address to listen on (default 127.0.0.1:8090)",
        );
        parser.refer(&mut realms).add_option(
            &["--realm"],
            Collect,
            "Realm to pre-create at boot (repeatable)",
        );
        parser.refer(&mut default_realm).add_option(
            &["--default-realm"],
            Store,
            "Realm auto-created alongside --realm entries",
        );
        parser.refer(&mut validation_mode).add_option(
            &["--validation-mode"],
            Store,
            "URI validation mode: strict (default) or loose",
        );
        parser.refer(&mut auto_create_realms).add_option(
            &["--auto-create-realms"],
            StoreTrue,
            "Create a realm on demand for any HELLO that names one that doesn't exist",
        );
        parser.refer(&mut abort_on_protocol_violation).add_option(
            &["--abort-on-protocol-violation"],
            StoreTrue,
            "ABORT and drop the session on an unexpected message instead of silently dropping it",
        );
        parser.refer(&mut verbose).add_option(
            &["-v", "--verbose"],
            StoreTrue,
            "Raise the log filter to debug",
        );
        parser.parse_args_or_exit();
    }

    if verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::init();
    }

    let validation_mode = match validation_mode.as_str() {
        "strict" => ValidationMode::Strict,
        "loose" => ValidationMode::Loose,
        other => {
            eprintln!("unknown --validation-mode '{}', expected strict or loose", other);
            std::process::exit(2);
        }
    };

    let config = RouterConfig {
        validation_mode,
        auto_create_realms,
        default_realm: if default_realm.is_empty() {
            None
        } else {
            Some(default_realm)
        },
        abort_on_protocol_violation,
    };

    let router = Router::with_config(config);
    for realm in &realms {
        router.add_realm(realm);
    }

    info!("router listening on {}", bind);
    let handle = router.listen(&bind);
    handle.join().unwrap();
}
