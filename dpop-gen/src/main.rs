use std::{fs, path::PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use josekit::jws::ES256;
use serde_json::Value;
use uuid::Uuid;

use token_endpoint::services::auth::dpop::{DpopKey, access_token_hash, proof_claims};

/// Generate a DPoP proof JWT for a token or resource request.
///
/// - Header: typ=dpop+jwt, alg, jwk (public part of the key)
/// - Claims: jti, htm, htu, iat, plus ath / nonce when given
/// - Outputs the proof, the key's JWK thumbprint (cnf.jkt) and the ath used
#[derive(Parser, Debug)]
#[command(name = "dpop-gen", version, about)]
struct Args {
    /// HTTP method (htm), e.g. POST for the token endpoint
    #[arg(long, default_value = "POST")]
    method: String,

    /// Full request URL used as htu (e.g. http://localhost:4000/api/v1/token)
    #[arg(long)]
    url: String,

    /// P-256 private key in PEM (PKCS#8). A fresh key is generated when omitted.
    #[arg(long, value_name = "FILE")]
    key_pem: Option<PathBuf>,

    /// Signing algorithm for a generated key (ES256, ES384, ES512, RS*, PS*)
    #[arg(long, default_value = "ES256")]
    alg: String,

    /// Save the generated ES256 key so later proofs reuse the same jkt
    #[arg(long, value_name = "FILE", conflicts_with = "key_pem")]
    write_key: Option<PathBuf>,

    /// Access token string. If provided, ath is included in the proof.
    #[arg(long)]
    access_token: Option<String>,

    /// Server-provided nonce
    #[arg(long)]
    nonce: Option<String>,

    /// Override iat (unix seconds). Default: now.
    #[arg(long)]
    iat: Option<i64>,

    /// Override jti. Default: random UUID v4.
    #[arg(long)]
    jti: Option<String>,

    /// Print only the proof
    #[arg(long, default_value_t = false)]
    quiet: bool,
}

fn load_key(args: &Args) -> Result<DpopKey> {
    if let Some(path) = &args.key_pem {
        if args.alg != "ES256" {
            bail!("--key-pem only supports ES256 keys");
        }
        let pem = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        return DpopKey::from_es256_pem(&pem).context("parsing --key-pem");
    }

    if let Some(path) = &args.write_key {
        if args.alg != "ES256" {
            bail!("--write-key only supports ES256 keys");
        }
        let pem = ES256.generate_key_pair()?.to_pem_private_key();
        fs::write(path, &pem).with_context(|| format!("writing {}", path.display()))?;
        return DpopKey::from_es256_pem(&pem).context("loading generated key");
    }

    DpopKey::generate(&args.alg).context("generating key")
}

fn main() -> Result<()> {
    let args = Args::parse();
    let key = load_key(&args)?;

    let iat = args.iat.unwrap_or_else(|| chrono::Utc::now().timestamp());
    let jti = args
        .jti
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let ath = args.access_token.as_deref().map(access_token_hash);

    let mut claims = proof_claims(&args.method.to_uppercase(), &args.url, iat, &jti);
    if let Some(ath) = &ath {
        claims.insert("ath".into(), Value::from(ath.as_str()));
    }
    if let Some(nonce) = &args.nonce {
        claims.insert("nonce".into(), Value::from(nonce.as_str()));
    }

    let proof = key.sign_claims(&claims)?;

    if args.quiet {
        println!("{proof}");
        return Ok(());
    }

    println!("DPoP: {proof}");
    println!("alg: {}", key.algorithm());
    println!("jkt (cnf.jkt): {}", key.thumbprint());
    println!("iat: {iat}");
    println!("jti: {jti}");
    match ath {
        Some(ath) => println!("ath: {ath}"),
        None => println!("ath: (none)"),
    }

    Ok(())
}
