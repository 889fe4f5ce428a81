use super::reader::{Trailer, VerifyDataReader};
use super::request::DecryptionRequest;
use super::verify::VerificationPolicy;
use super::{InnerMessage, StreamDecryptor};
use crate::error::{FormatError, Result};
use crate::packet::{Packet, PacketReader, SequencePolicy, Signature};
use std::io::{self, Cursor, Read};
use tracing::debug;

/// Decrypts a message and a separately encrypted detached signature.
///
/// Both streams are unlocked with the same credential; a password is asked
/// for once per stream. The signature stream is read completely at setup and
/// must carry at least one signature packet inside its literal data. The
/// returned reader streams the data plaintext, takes its metadata only from
/// the data stream and verifies those signatures once drained.
///
/// 解密消息以及单独加密的分离签名。
/// 两个流使用同一凭据解锁，口令对每个流各询问一次。签名流在建立阶段被完整读取，
/// 其字面数据中必须至少包含一个签名数据包。返回的读取器流式输出数据明文，
/// 元信息只取自数据流，并在读尽后验证这些签名。
pub fn decrypt_detached<'a, D, S>(
    request: &DecryptionRequest,
    data: D,
    signature: S,
) -> Result<VerifyDataReader<'a>>
where
    D: Read + 'a,
    S: Read + 'a,
{
    let decryptor = StreamDecryptor::new(request);
    let config = request.config();

    let signatures = {
        let opened = decryptor.open(Box::new(signature))?;
        let inner = InnerMessage::parse(
            opened.plaintext,
            SequencePolicy::Relaxed,
            config.max_packet_size(),
        )?;
        let payload = read_bounded(inner.body, config.max_signature_size())?;
        parse_signatures(payload, config.max_packet_size())?
    };
    let text = signatures
        .last()
        .is_some_and(|signature| signature.sig_type().is_text());
    debug!(signatures = signatures.len(), text, "detached signatures loaded");

    let opened = decryptor.open(Box::new(data))?;
    let inner = InnerMessage::parse(opened.plaintext, opened.policy, config.max_packet_size())?;
    let verification = VerificationPolicy::new(request, opened.decrypted_with);
    let session_key = request.retrieve_session_key.then_some(opened.session_key);
    Ok(VerifyDataReader::new(
        &inner.literal,
        inner.body,
        signatures,
        text,
        Trailer::Detached,
        verification,
        session_key,
    ))
}

/// Reads at most `limit` bytes of `body`, then drains the rest of its
/// stream so the encrypted data packet is authenticated to its end.
fn read_bounded<R: Read>(body: R, limit: usize) -> Result<Vec<u8>> {
    let mut limited = body.take(limit as u64 + 1);
    let mut payload = Vec::new();
    limited.read_to_end(&mut payload)?;
    if payload.len() > limit {
        return Err(FormatError::PacketTooLarge(payload.len() as u64).into());
    }
    io::copy(&mut limited.into_inner(), &mut io::sink())?;
    Ok(payload)
}

fn parse_signatures(payload: Vec<u8>, max_packet_size: u64) -> Result<Vec<Signature>> {
    let mut packets = PacketReader::new(Cursor::new(payload), max_packet_size);
    let mut signatures = Vec::new();
    while let Some(packet) = packets.next_packet()? {
        match packet {
            Packet::Signature(signature) => signatures.push(signature),
            Packet::Marker | Packet::Unknown(_) => {}
            other => return Err(FormatError::UnexpectedPacket(other.tag()).into()),
        }
    }
    if signatures.is_empty() {
        return Err(FormatError::MissingSignature.into());
    }
    Ok(signatures)
}
