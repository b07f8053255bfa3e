//! Bitcoin P2SH deposit address service

use sneed::rwtxn::Error as RwTxnError;

use crate::{
    core::Core,
    state,
    swapapi::{Error, P2shAddressInfo},
    tokens::P2shBridge,
};

fn p2sh_bridge(core: &Core) -> Result<&dyn P2shBridge, Error> {
    core.bridges.source().p2sh().ok_or(Error::NotBtcBridge)
}

fn derive_info(
    p2sh: &dyn P2shBridge,
    bind_address: &str,
) -> Result<P2shAddressInfo, Error> {
    let pair = p2sh.get_p2sh_address(bind_address)?;
    let script = bitcoin::ScriptBuf::from_bytes(pair.redeem_script.clone());
    Ok(P2shAddressInfo {
        bind_address: bind_address.to_owned(),
        p2sh_address: pair.p2sh_address,
        redeem_script: hex::encode(&pair.redeem_script),
        redeem_script_disasm: script.to_asm_string(),
    })
}

/// Derive the P2SH deposit address for a bind address and record the
/// mapping on first sight
pub fn register_p2sh_address(
    core: &Core,
    bind_address: &str,
) -> Result<P2shAddressInfo, Error> {
    let p2sh = p2sh_bridge(core)?;
    // the bind is the user's destination-chain address
    if !core.bridges.destination().is_valid_address(bind_address) {
        return Err(Error::InvalidAddress(bind_address.to_owned()));
    }
    let info = derive_info(p2sh, bind_address)?;
    let mut rwtxn = core.write_txn()?;
    core.store
        .add_p2sh_address(&mut rwtxn, bind_address, &info.p2sh_address)?;
    rwtxn
        .commit()
        .map_err(RwTxnError::from)
        .map_err(state::Error::from)?;
    tracing::info!(
        bind = %bind_address,
        p2sh = %info.p2sh_address,
        "registered p2sh address"
    );
    Ok(info)
}

/// Resolve a P2SH address back to its bind address and re-derive the full
/// info. Read-only: an unknown mapping fails rather than auto-deriving.
pub fn get_p2sh_address_info(
    core: &Core,
    p2sh_address: &str,
) -> Result<P2shAddressInfo, Error> {
    let p2sh = p2sh_bridge(core)?;
    let bind_address = {
        let rotxn = core.read_txn()?;
        core.store
            .try_get_p2sh_bind_address(&rotxn, p2sh_address)?
            .ok_or(Error::P2shMappingNotFound)?
    };
    derive_info(p2sh, &bind_address)
}
