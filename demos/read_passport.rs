//! End-to-end demo: open a Proxmark3, select the MRTD application, run BAC
//! against an MRZ supplied via environment variables, and read EF.COM
//! through the resulting secure channel.
//!
//! ```text
//! DOCUMENT_NUMBER=L898902C3 DATE_OF_BIRTH=740812 DATE_OF_EXPIRY=101031 \
//!     cargo run --features proxmark3 --bin read-passport
//! ```

#[path = "proxmark3.rs"]
mod proxmark3;

use anyhow::{Context, Result};
use icao9303::{
    bac,
    crypto::mrz::MrzKey,
    service::ApduService,
    transport::{file_id, sfid, CardTransport, MRTD_AID},
};
use proxmark3::Proxmark3Transport;
use std::env;

fn main() -> Result<()> {
    env_logger::init();

    let document_number =
        env::var("DOCUMENT_NUMBER").context("set DOCUMENT_NUMBER to the MRZ document number")?;
    let date_of_birth =
        env::var("DATE_OF_BIRTH").context("set DATE_OF_BIRTH to the MRZ date of birth (YYMMDD)")?;
    let date_of_expiry = env::var("DATE_OF_EXPIRY")
        .context("set DATE_OF_EXPIRY to the MRZ date of expiry (YYMMDD)")?;
    let mrz = MrzKey::new(document_number, date_of_birth, date_of_expiry)
        .context("invalid MRZ fields")?;

    let mut transport = Proxmark3Transport::detect().context("connecting to Proxmark3")?;
    transport.open().context("activating card")?;
    if let Some(atr) = transport.atr() {
        println!("ATS: {}", hex::encode(atr));
    }

    let mut service = ApduService::new(transport);
    service
        .select_application(&MRTD_AID)
        .context("selecting the MRTD application")?;

    match service.read_elementary_file(file_id::EF_CARD_ACCESS) {
        Ok(data) => println!("EF.CardAccess: {}", hex::encode(data)),
        Err(e) => println!("EF.CardAccess not readable before BAC ({e}), continuing"),
    }

    let mut rng = rand::thread_rng();
    let channel = bac::run(&mut service, &mrz, &mut rng).context("BAC mutual authentication")?;
    println!("BAC established, SSC = {:016X}", channel.ssc());
    service.set_channel(channel);

    let ef_com = service
        .read_binary_by_sfid(sfid::EF_COM, 0, 256)
        .context("reading EF.COM over the secure channel")?;
    println!("EF.COM: {}", hex::encode(ef_com));

    Ok(())
}
