//! Solana transfer builder (System, SPL Token and Token-2022 programs).

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::blockchain::solana::message::{compile_message, encode_transaction, AccountMeta, Instruction, Pubkey};
use crate::chain::{convert_to_smallest_unit, AmountType, ChainDescriptor, SolanaChain};
use crate::transaction::{BuildError, BuildResult, FeeParameters, TransactionBuilder, TransactionIntent};

pub const SYSTEM_PROGRAM_ID: &str = "11111111111111111111111111111111";
pub const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
pub const TOKEN_2022_PROGRAM_ID: &str = "TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb";
pub const ASSOCIATED_TOKEN_PROGRAM_ID: &str = "ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL";
pub const COMPUTE_BUDGET_PROGRAM_ID: &str = "ComputeBudget111111111111111111111111111111";

const SYSTEM_TRANSFER: u32 = 2;
const TOKEN_TRANSFER_CHECKED: u8 = 12;
const ATA_CREATE_IDEMPOTENT: u8 = 1;
const SET_COMPUTE_UNIT_LIMIT: u8 = 2;
const SET_COMPUTE_UNIT_PRICE: u8 = 3;

/// Compute-budget parameters for a transfer.
///
/// Creating the destination token account costs more compute, so the limit
/// rises and the price per unit drops to keep the priority fee comparable.
pub fn compute_budget_for(destination_account_exists: bool) -> FeeParameters {
    let (compute_unit_limit, compute_unit_price) = if destination_account_exists {
        (200_000, 1_000_000)
    } else {
        (400_000, 500_000)
    };
    FeeParameters::Solana {
        compute_unit_limit,
        compute_unit_price,
        destination_account_exists,
    }
}

/// The program that owns a mint and every token account of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenProgram {
    Spl,
    Token2022,
}

impl TokenProgram {
    pub const ALL: [TokenProgram; 2] = [TokenProgram::Spl, TokenProgram::Token2022];

    pub fn id(&self) -> &'static str {
        match self {
            TokenProgram::Spl => TOKEN_PROGRAM_ID,
            TokenProgram::Token2022 => TOKEN_2022_PROGRAM_ID,
        }
    }

    pub fn pubkey(&self) -> BuildResult<Pubkey> {
        Pubkey::from_base58(self.id())
    }

    /// The program whose id is `owner`, if it is a token program.
    pub fn from_owner(owner: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|program| program.id() == owner)
    }

    /// Size of a token account without extensions.
    ///
    /// Token-2022 associated accounts always carry the immutable-owner extension.
    pub fn base_account_space(&self) -> u64 {
        match self {
            TokenProgram::Spl => 165,
            TokenProgram::Token2022 => 170,
        }
    }
}

/// Associated token account of `owner` for `mint` under `program`.
pub fn associated_token_address(owner: &Pubkey, mint: &Pubkey, program: TokenProgram) -> BuildResult<Pubkey> {
    let token_program = program.pubkey()?;
    let ata_program = Pubkey::from_base58(ASSOCIATED_TOKEN_PROGRAM_ID)?;
    let (address, _) = Pubkey::find_program_address(&[&owner.0, &token_program.0, &mint.0], &ata_program)?;
    Ok(address)
}

/// A compiled message awaiting its signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolanaUnsignedTransaction {
    pub message: Vec<u8>,
}

/// Builds legacy transfer transactions for one ed25519 wallet key.
#[derive(Debug, Clone)]
pub struct SolanaTransactionBuilder {
    chain: SolanaChain,
    owner: Pubkey,
    recent_blockhash: Option<[u8; 32]>,
    /// Owning program per mint address.
    token_programs: HashMap<String, TokenProgram>,
}

impl SolanaTransactionBuilder {
    pub fn new(public_key: &[u8], chain: SolanaChain) -> BuildResult<Self> {
        let owner = Pubkey::from_slice(public_key).ok_or_else(|| {
            BuildError::InvalidPublicKey(format!("expected 32-byte ed25519 key, got {} bytes", public_key.len()))
        })?;
        Ok(Self {
            chain,
            owner,
            recent_blockhash: None,
            token_programs: HashMap::new(),
        })
    }

    pub fn owner(&self) -> &Pubkey {
        &self.owner
    }

    pub fn set_token_program(&mut self, mint: impl Into<String>, program: TokenProgram) {
        self.token_programs.insert(mint.into(), program);
    }

    pub fn token_program(&self, mint: &str) -> Option<TokenProgram> {
        self.token_programs.get(mint).copied()
    }

    pub fn set_recent_blockhash(&mut self, blockhash: &str) -> BuildResult<()> {
        let bytes = bs58::decode(blockhash)
            .into_vec()
            .map_err(|e| BuildError::BuildFailed(format!("invalid blockhash: {e}")))?;
        let hash = <[u8; 32]>::try_from(bytes.as_slice())
            .map_err(|_| BuildError::BuildFailed(format!("blockhash must be 32 bytes, got {}", bytes.len())))?;
        self.recent_blockhash = Some(hash);
        Ok(())
    }

    /// The serialized message for `intent`, also used for fee queries.
    pub fn build_message(&self, intent: &TransactionIntent) -> BuildResult<Vec<u8>> {
        let blockhash = self
            .recent_blockhash
            .ok_or(BuildError::MissingChainState("recent blockhash"))?;
        let instructions = self.instructions(intent)?;
        compile_message(&self.owner, &instructions, &blockhash)
    }

    fn instructions(&self, intent: &TransactionIntent) -> BuildResult<Vec<Instruction>> {
        let (limit, price, destination_exists) = match intent.fee.parameters {
            Some(FeeParameters::Solana {
                compute_unit_limit,
                compute_unit_price,
                destination_account_exists,
            }) => (Some(compute_unit_limit), Some(compute_unit_price), destination_account_exists),
            // Without parameters the destination is assumed to exist.
            _ => (None, None, true),
        };

        let destination = Pubkey::from_base58(&intent.destination_address)?;
        let mut instructions = Vec::with_capacity(4);
        let budget = Pubkey::from_base58(COMPUTE_BUDGET_PROGRAM_ID)?;
        if let Some(limit) = limit {
            let mut data = vec![SET_COMPUTE_UNIT_LIMIT];
            data.extend_from_slice(&limit.to_le_bytes());
            instructions.push(Instruction {
                program_id: budget,
                accounts: Vec::new(),
                data,
            });
        }
        if let Some(price) = price {
            let mut data = vec![SET_COMPUTE_UNIT_PRICE];
            data.extend_from_slice(&price.to_le_bytes());
            instructions.push(Instruction {
                program_id: budget,
                accounts: Vec::new(),
                data,
            });
        }

        match &intent.amount.kind {
            AmountType::Coin => {
                let lamports = self.chain.to_smallest_unit(intent.amount.value)?;
                let mut data = SYSTEM_TRANSFER.to_le_bytes().to_vec();
                data.extend_from_slice(&lamports.to_le_bytes());
                instructions.push(Instruction {
                    program_id: Pubkey::from_base58(SYSTEM_PROGRAM_ID)?,
                    accounts: vec![
                        AccountMeta::writable(self.owner, true),
                        AccountMeta::writable(destination, false),
                    ],
                    data,
                });
            }
            AmountType::Token(token) => {
                let mint = Pubkey::from_base58(&token.contract_address)?;
                let decimals = u8::try_from(token.decimal_count)
                    .map_err(|_| BuildError::BuildFailed(format!("unsupported decimals {}", token.decimal_count)))?;
                let units = convert_to_smallest_unit(intent.amount.value, token.decimal_count, self.chain.rounding())?;

                let program = self
                    .token_program(&token.contract_address)
                    .ok_or(BuildError::MissingChainState("token program"))?;
                let token_program = program.pubkey()?;
                let source_ata = associated_token_address(&self.owner, &mint, program)?;
                let destination_ata = associated_token_address(&destination, &mint, program)?;

                if !destination_exists {
                    instructions.push(Instruction {
                        program_id: Pubkey::from_base58(ASSOCIATED_TOKEN_PROGRAM_ID)?,
                        accounts: vec![
                            AccountMeta::writable(self.owner, true),
                            AccountMeta::writable(destination_ata, false),
                            AccountMeta::readonly(destination, false),
                            AccountMeta::readonly(mint, false),
                            AccountMeta::readonly(Pubkey::from_base58(SYSTEM_PROGRAM_ID)?, false),
                            AccountMeta::readonly(token_program, false),
                        ],
                        data: vec![ATA_CREATE_IDEMPOTENT],
                    });
                }

                let mut data = vec![TOKEN_TRANSFER_CHECKED];
                data.extend_from_slice(&units.to_le_bytes());
                data.push(decimals);
                instructions.push(Instruction {
                    program_id: token_program,
                    accounts: vec![
                        AccountMeta::writable(source_ata, false),
                        AccountMeta::readonly(mint, false),
                        AccountMeta::writable(destination_ata, false),
                        AccountMeta::readonly(self.owner, true),
                    ],
                    data,
                });
            }
            AmountType::Reserve | AmountType::FeeResource => return Err(BuildError::InvalidAmountType),
        }
        Ok(instructions)
    }
}

impl TransactionBuilder for SolanaTransactionBuilder {
    type Unsigned = SolanaUnsignedTransaction;
    /// Base64 wire transaction.
    type Payload = String;

    fn build_for_sign(&self, intent: &TransactionIntent) -> BuildResult<(Self::Unsigned, Vec<u8>)> {
        let message = self.build_message(intent)?;
        Ok((SolanaUnsignedTransaction { message: message.clone() }, message))
    }

    fn build_for_send(&self, unsigned: &Self::Unsigned, signature: &[u8]) -> BuildResult<Self::Payload> {
        let signature = <[u8; 64]>::try_from(signature).map_err(|_| {
            BuildError::InvalidSignature(format!("expected 64-byte ed25519 signature, got {}", signature.len()))
        })?;
        let wire = encode_transaction(&[signature], &unsigned.message)?;
        Ok(BASE64.encode(wire))
    }
}
