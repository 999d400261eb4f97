//! Who may unlock each script template, checked with real signatures and
//! through the chain's transaction validation

mod common;

use rand::rngs::StdRng;
use rand::SeedableRng;

use common::Network;
use p2l_leasing_libs::crypto::KeyPair;
use p2l_leasing_libs::data_structures::{Transaction, TxIn, TxOut, Witness};
use p2l_leasing_libs::wallet::{LeaseOptions, Wallet};
use p2l_leasing_libs::{
    authorize_spend, Amount, AuthorizationError, ClassifiedScript, LeasingError, OutPoint, Script,
    SpendPurpose,
};

const MESSAGE: &[u8] = b"sighash";

struct Keys {
    owner: KeyPair,
    counterparty: KeyPair,
    stranger: KeyPair,
    rng: StdRng,
}

impl Keys {
    fn new() -> Self {
        let mut rng = StdRng::seed_from_u64(77);
        Self {
            owner: KeyPair::random(&mut rng),
            counterparty: KeyPair::random(&mut rng),
            stranger: KeyPair::random(&mut rng),
            rng,
        }
    }

    fn witness(&mut self, signer: &KeyPair) -> Witness {
        Witness {
            public_key: signer.public_key_bytes(),
            signature: signer.sign(MESSAGE, &mut self.rng).unwrap(),
        }
    }

    fn check(
        &mut self,
        script: &ClassifiedScript,
        signer: KeyPair,
        purpose: SpendPurpose,
    ) -> Result<(), AuthorizationError> {
        let witness = self.witness(&signer);
        authorize_spend(script, &witness, MESSAGE, purpose)
    }
}

#[test]
fn test_authorization_matrix() {
    let mut keys = Keys::new();
    let owner = keys.owner.key_hash();
    let other = keys.counterparty.key_hash();
    let (o, c, s) = (keys.owner.clone(), keys.counterparty.clone(), keys.stranger.clone());
    use AuthorizationError::*;
    use SpendPurpose::{Spend, Stake};

    let standard = ClassifiedScript::Standard(owner);
    let cold_stake = ClassifiedScript::ColdStake { owner, staker: other };
    let lease = ClassifiedScript::Lease { owner, leaser: other };
    let reward = ClassifiedScript::LeaseReward { owner, leaser: other };

    let cases: Vec<(&ClassifiedScript, &KeyPair, SpendPurpose, Result<(), AuthorizationError>)> = vec![
        (&standard, &o, Spend, Ok(())),
        (&standard, &s, Spend, Err(EqualVerify)),
        (&cold_stake, &o, Spend, Ok(())),
        (&cold_stake, &o, Stake, Ok(())),
        (&cold_stake, &c, Spend, Err(ColdStakeVerify)),
        (&cold_stake, &c, Stake, Ok(())),
        (&cold_stake, &s, Stake, Err(EqualVerify)),
        (&lease, &o, Spend, Ok(())),
        (&lease, &c, Spend, Err(LeaseVerify)),
        (&lease, &c, Stake, Err(LeaseVerify)),
        (&lease, &s, Spend, Err(EqualVerify)),
        (&reward, &o, Spend, Ok(())),
        (&reward, &c, Spend, Err(EqualVerify)),
    ];
    for (script, signer, purpose, expected) in cases {
        assert_eq!(
            keys.check(script, signer.clone(), purpose),
            expected,
            "{:?} signed by {:?} for {:?}",
            script.pattern(),
            signer.key_hash(),
            purpose
        );
    }

    let nonstandard = ClassifiedScript::Nonstandard(Script::new(vec![0x6a, 0x01, 0x02]));
    assert_eq!(keys.check(&nonstandard, o, Spend), Err(Nonstandard));
}

#[test]
fn test_signature_must_cover_the_message() {
    let mut keys = Keys::new();
    let owner = keys.owner.clone();
    let script = ClassifiedScript::Lease {
        owner: owner.key_hash(),
        leaser: keys.counterparty.key_hash(),
    };
    let witness = keys.witness(&owner);
    assert_eq!(
        authorize_spend(&script, &witness, b"another message", SpendPurpose::Spend),
        Err(AuthorizationError::CheckSig)
    );

    let truncated = Witness {
        public_key: witness.public_key.clone(),
        signature: witness.signature[..10].to_vec(),
    };
    assert_eq!(
        authorize_spend(&script, &truncated, MESSAGE, SpendPurpose::Spend),
        Err(AuthorizationError::CheckSig)
    );
}

#[test]
fn test_chain_rejects_replayed_witness() {
    let mut net = Network::new();
    let mut rng = StdRng::seed_from_u64(5);
    let key = KeyPair::random(&mut rng);
    net.mine(key.key_hash(), false, 2);
    let coinbase_1 = net.chain.block_at(1).unwrap().coinbase.outpoint(0);
    let coinbase_2 = net.chain.block_at(2).unwrap().coinbase.outpoint(0);

    let pay = |prevout: OutPoint| {
        Transaction::new(
            vec![TxIn::unsigned(prevout)],
            vec![TxOut::new(
                Amount::from_coins(249),
                ClassifiedScript::Standard(key.key_hash()).to_script(),
            )],
        )
    };

    // A witness signed for one transaction does not unlock another
    let first = pay(coinbase_1);
    let witness = key.sign_input(&first, 0, &mut rng).unwrap();
    let mut second = pay(coinbase_2);
    second.inputs[0].witness = witness;
    let err = net.chain.accept_to_mempool(second).unwrap_err();
    assert_eq!(
        err,
        LeasingError::UnauthorizedSpend {
            outpoint: coinbase_2,
            reason: AuthorizationError::CheckSig.to_string(),
        }
    );

    let mut first = first;
    first.inputs[0].witness = key.sign_input(&first, 0, &mut rng).unwrap();
    net.chain.accept_to_mempool(first).unwrap();
}

#[test]
fn test_owner_key_imported_elsewhere_can_reclaim_lease() {
    let mut net = Network::new();
    let mut owner = Wallet::from_seed(31);
    let mut leaser = Wallet::from_seed(32);
    net.fund(&mut owner, 1);
    net.enable_all_sporks();

    let owner_key = KeyPair::random(&mut StdRng::seed_from_u64(33));
    let owner_address = p2l_leasing_libs::Address::standard(owner_key.key_hash()).to_base58();
    let options = LeaseOptions {
        force_external_owner: true,
        ..LeaseOptions::default()
    };
    let result = owner
        .lease_to_address(
            &mut net.chain,
            &leaser.get_new_leasing_address().to_base58(),
            Amount::from_coins(100),
            Some(&owner_address),
            options,
        )
        .unwrap();
    net.mine(owner.get_new_address().hash, false, 1);
    let lease = OutPoint::new(result.txid, 0);

    // The funding wallet holds no key for the lease
    assert!(matches!(
        owner.spend_outputs(&mut net.chain, &[lease], None),
        Err(LeasingError::Wallet(_))
    ));

    let mut cold_wallet = Wallet::from_seed(34);
    cold_wallet.import_key(owner_key);
    cold_wallet.spend_outputs(&mut net.chain, &[lease], None).unwrap();
    net.mine(owner.get_new_address().hash, false, 1);
    assert!(!net.chain.utxos().contains(&lease));
    assert!(net.chain.registry().get(&lease).is_none());
}
