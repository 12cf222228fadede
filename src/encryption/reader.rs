use aes::Aes256;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::generic_array::GenericArray;
use cbc::cipher::{BlockEncryptMut, KeyIvInit};
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

use super::{EncryptionKey, Iv};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;

const BLOCK_LEN: usize = 16;
const READ_CHUNK: usize = 64 * 1024;

/// `AsyncRead` adapter that AES-256-CBC encrypts everything read from `inner`.
///
/// Memory use is bounded by one read chunk plus one partial block; the final
/// padded block is emitted when `inner` reaches end of stream. Read errors
/// from `inner` are passed through untouched.
pub struct EncryptingReader<R> {
    inner: R,
    // None once the final padded block has been produced
    cipher: Option<Aes256CbcEnc>,
    scratch: Box<[u8]>,
    pending: Vec<u8>,
    output: Vec<u8>,
    output_pos: usize,
}

impl<R> EncryptingReader<R>
where
    R: AsyncRead + Unpin,
{
    pub(crate) fn new(inner: R, key: &EncryptionKey, iv: &Iv) -> Self {
        let cipher = Aes256CbcEnc::new(key.as_bytes().into(), iv.into());
        Self {
            inner,
            cipher: Some(cipher),
            scratch: vec![0u8; READ_CHUNK].into_boxed_slice(),
            pending: Vec::with_capacity(BLOCK_LEN),
            output: Vec::with_capacity(READ_CHUNK + BLOCK_LEN),
            output_pos: 0,
        }
    }

    fn encrypt_pending_blocks(&mut self) {
        let whole = self.pending.len() - self.pending.len() % BLOCK_LEN;
        if whole == 0 {
            return;
        }
        if let Some(cipher) = self.cipher.as_mut() {
            for block in self.pending[..whole].chunks_exact_mut(BLOCK_LEN) {
                cipher.encrypt_block_mut(GenericArray::from_mut_slice(block));
            }
        }
        self.output.extend_from_slice(&self.pending[..whole]);
        self.pending.drain(..whole);
    }

    fn finish(&mut self) {
        if let Some(cipher) = self.cipher.take() {
            let last = cipher.encrypt_padded_vec_mut::<Pkcs7>(&self.pending);
            self.pending.clear();
            self.output.extend_from_slice(&last);
        }
    }
}

impl<R> AsyncRead for EncryptingReader<R>
where
    R: AsyncRead + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        loop {
            if this.output_pos < this.output.len() {
                let available = &this.output[this.output_pos..];
                let n = available.len().min(buf.remaining());
                buf.put_slice(&available[..n]);
                this.output_pos += n;
                if this.output_pos == this.output.len() {
                    this.output.clear();
                    this.output_pos = 0;
                }
                return Poll::Ready(Ok(()));
            }

            if this.cipher.is_none() {
                return Poll::Ready(Ok(()));
            }

            let mut scratch = ReadBuf::new(&mut this.scratch);
            ready!(Pin::new(&mut this.inner).poll_read(cx, &mut scratch))?;
            let read = scratch.filled().len();

            if read == 0 {
                this.finish();
            } else {
                this.pending.extend_from_slice(&this.scratch[..read]);
                this.encrypt_pending_blocks();
            }
        }
    }
}
